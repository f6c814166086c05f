//! Offline stand-ins used in debugging mode.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DeliveryError;
use crate::social::{DeliveryClient, PostId, RemotePost, TimelineReader};

/// Logs deliveries instead of publishing them.
#[derive(Debug, Default)]
pub struct DryRunClient {
    sent: AtomicU64,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries accepted so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> PostId {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        format!("dry-run-{}", n)
    }
}

#[async_trait]
impl DeliveryClient for DryRunClient {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn post(&self, text: &str) -> Result<PostId, DeliveryError> {
        let id = self.next_id();
        tracing::info!("[dry run] Would post ({}): {}", id, text);
        Ok(id)
    }

    async fn reply(&self, text: &str, parent_id: &str) -> Result<PostId, DeliveryError> {
        let id = self.next_id();
        tracing::info!("[dry run] Would reply to {} ({}): {}", parent_id, id, text);
        Ok(id)
    }
}

/// Timeline backed by a JSON file, re-read on every lookup so it can be
/// edited while the agent runs.
///
/// ```json
/// {"test_tweets": {"alice": {"id": "101", "text": "hello"}}}
/// ```
#[derive(Debug, Clone)]
pub struct FixtureTimeline {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    test_tweets: HashMap<String, RemotePost>,
}

impl FixtureTimeline {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<FixtureFile, DeliveryError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DeliveryError::RequestFailed {
                service: "fixture".to_string(),
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;
        serde_json::from_str(&raw).map_err(|e| DeliveryError::InvalidResponse {
            service: "fixture".to_string(),
            reason: format!("{}: {}", self.path.display(), e),
        })
    }
}

#[async_trait]
impl TimelineReader for FixtureTimeline {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn ensure_ready(&self) -> Result<(), DeliveryError> {
        self.load().await.map(|_| ())
    }

    async fn latest_post(&self, handle: &str) -> Result<Option<RemotePost>, DeliveryError> {
        let mut fixture = self.load().await?;
        Ok(fixture.test_tweets.remove(handle))
    }
}
