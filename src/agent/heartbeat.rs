//! Single-instance heartbeat lock.
//!
//! At startup the agent creates a heartbeat file, takes an exclusive lock on
//! it and writes the current time. It then rewrites the timestamp on every
//! tick. The file is removed on graceful shutdown. If it is still there at
//! startup, another instance is assumed to be running (or a previous one
//! crashed) and startup is refused until the file is cleared.
//!
//! ```text
//! $ cat agent.heartbeat
//! 2026-03-01T12:00:05.123456+00:00
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs4::FileExt;

use crate::error::HeartbeatError;

/// Configuration for the heartbeat lock.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Location of the heartbeat file.
    pub path: PathBuf,
    /// Attempts made when refreshing the timestamp.
    pub write_attempts: u32,
    /// Pause between refresh attempts.
    pub retry_delay: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("agent.heartbeat"),
            write_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl HeartbeatConfig {
    /// Create a config for a specific path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the refresh retry behaviour.
    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.write_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }
}

/// What an inspection of the heartbeat file found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatStatus {
    pub path: PathBuf,
    /// Last timestamp written, if the file parsed.
    pub last_beat: Option<DateTime<Utc>>,
    /// Raw file content, trimmed.
    pub raw: String,
}

impl HeartbeatStatus {
    /// Time since the last beat, if one could be read.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_beat.map(|beat| now - beat)
    }
}

/// Exclusive ownership of the heartbeat file.
///
/// Held by the core manager for the life of the process. Releasing is
/// idempotent and also happens on drop.
#[derive(Debug)]
pub struct HeartbeatLock {
    config: HeartbeatConfig,
    file: Option<File>,
}

impl HeartbeatLock {
    /// Create the heartbeat file and lock it.
    ///
    /// Fails with `AlreadyRunning` when the file already exists.
    pub fn acquire(config: HeartbeatConfig) -> Result<Self, HeartbeatError> {
        let path = config.path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HeartbeatError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(HeartbeatError::AlreadyRunning { path });
            }
            Err(source) => return Err(HeartbeatError::Io { path, source }),
        };

        let file = lock_created(file, &path)?;

        let mut lock = Self {
            config,
            file: Some(file),
        };
        if let Err(source) = lock.write_timestamp(Utc::now()) {
            lock.release_quietly();
            return Err(HeartbeatError::Io { path, source });
        }

        tracing::info!("Heartbeat lock acquired: {}", path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Rewrite the timestamp, retrying a few times before giving up.
    ///
    /// A failed refresh is logged and otherwise ignored; the lock stays held.
    pub async fn beat(&mut self) -> bool {
        if self.file.is_none() {
            return false;
        }

        let attempts = self.config.write_attempts.max(1);
        for attempt in 1..=attempts {
            match self.write_timestamp(Utc::now()) {
                Ok(()) => return true,
                Err(e) if attempt < attempts => {
                    tracing::debug!(
                        "Heartbeat write attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to refresh heartbeat {} after {} attempts: {}",
                        self.config.path.display(),
                        attempts,
                        e
                    );
                }
            }
        }
        false
    }

    /// Unlock and delete the heartbeat file. Safe to call more than once.
    pub fn release(&mut self) -> Result<(), HeartbeatError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let path = self.config.path.clone();

        if let Err(e) = file.unlock() {
            tracing::warn!("Failed to unlock heartbeat {}: {}", path.display(), e);
        }
        drop(file);

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(HeartbeatError::Io { path, source }),
        }

        tracing::info!("Heartbeat lock released: {}", path.display());
        Ok(())
    }

    fn release_quietly(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("{}", e);
        }
    }

    fn write_timestamp(&mut self, now: DateTime<Utc>) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::other("heartbeat not held"));
        };
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(now.to_rfc3339().as_bytes())?;
        file.flush()
    }
}

/// Lock a heartbeat file this process just created. If the lock can't be
/// taken the file is removed again so it doesn't block later starts.
fn lock_created(file: File, path: &Path) -> Result<File, HeartbeatError> {
    if file.try_lock_exclusive().is_ok() {
        return Ok(file);
    }
    drop(file);
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to remove unlocked heartbeat {}: {}", path.display(), e);
    }
    Err(HeartbeatError::Locked {
        path: path.to_path_buf(),
    })
}

impl Drop for HeartbeatLock {
    fn drop(&mut self) {
        self.release_quietly();
    }
}

/// Read the heartbeat file without taking the lock.
///
/// Returns `None` when there is no heartbeat file.
pub fn read_status(path: &Path) -> Result<Option<HeartbeatStatus>, HeartbeatError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(HeartbeatError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let raw = raw.trim().to_string();
    let last_beat = DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc));

    Ok(Some(HeartbeatStatus {
        path: path.to_path_buf(),
        last_beat,
        raw,
    }))
}

/// Remove a stale heartbeat file left behind by a crashed instance.
///
/// Returns whether a file was removed.
pub fn clear_stale(path: &Path) -> Result<bool, HeartbeatError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(HeartbeatError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
