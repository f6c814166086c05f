//! Fixed-interval tick loop.
//!
//! Each iteration runs one tick and then sleeps for whatever is left of the
//! interval. A tick that overruns starts the next one immediately; missed
//! ticks are not replayed. A stop request interrupts the sleep but never a
//! tick in progress.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;

/// Something the scheduler drives.
#[async_trait]
pub trait TickTarget: Send {
    async fn tick(&mut self);
    async fn shutdown(&mut self);
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub overruns: u64,
}

/// Sender half used to request a stop.
#[derive(Debug, Clone)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        // Receivers may already be gone if the loop exited on its own.
        let _ = self.0.send(true);
    }
}

/// Create a linked stop handle and signal.
pub fn stop_channel() -> (StopHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), rx)
}

/// Drives a [`TickTarget`] at a fixed interval until stopped.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: Duration,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick until `stop` flips to true (or its sender is dropped), then shut
    /// the target down.
    pub async fn run<T: TickTarget + ?Sized>(
        &self,
        target: &mut T,
        mut stop: watch::Receiver<bool>,
    ) -> TickStats {
        let mut stats = TickStats::default();
        tracing::info!("Tick loop started (interval {:?})", self.interval);

        loop {
            if *stop.borrow() {
                break;
            }

            let started = Instant::now();
            target.tick().await;
            stats.ticks += 1;

            let remaining = self.interval.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                stats.overruns += 1;
                tracing::debug!(
                    "Tick {} overran the {:?} interval",
                    stats.ticks,
                    self.interval
                );
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Stop signal dropped, ending tick loop");
                        break;
                    }
                }
            }
        }

        tracing::info!("Tick loop stopping after {} ticks", stats.ticks);
        target.shutdown().await;
        stats
    }
}
