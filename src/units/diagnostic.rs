//! Diagnostic core: periodic liveness line in the event log.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::agent::CoreUnit;
use crate::error::UnitError;

pub struct DiagnosticUnit {
    name: String,
    interval: Duration,
    ticks: u64,
    last_report: Option<DateTime<Utc>>,
    reports: u64,
}

impl DiagnosticUnit {
    pub fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            interval,
            ticks: 0,
            last_report: None,
            reports: 0,
        }
    }

    #[cfg(test)]
    fn reports(&self) -> u64 {
        self.reports
    }
}

#[async_trait]
impl CoreUnit for DiagnosticUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&mut self) -> Result<(), UnitError> {
        if self.interval.is_zero() {
            return Err(UnitError::InitFailed {
                name: self.name.clone(),
                reason: "report interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    async fn tick(&mut self, now: DateTime<Utc>) -> Result<(), UnitError> {
        self.ticks += 1;
        let interval =
            chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::seconds(30));
        if self.last_report.is_some_and(|last| now - last < interval) {
            return Ok(());
        }

        self.last_report = Some(now);
        self.reports += 1;
        tracing::info!(
            "Core {} alive at {} (report {}, {} ticks)",
            self.name,
            now.to_rfc3339(),
            self.reports,
            self.ticks
        );
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.last_report = None;
    }
}
