//! Social network collaborators.
//!
//! Units publish through a [`DeliveryClient`] and watch other accounts
//! through a [`TimelineReader`]. The X API v2 client implements both; the
//! dry-run client and fixture timeline stand in for them in debugging mode.

mod dry_run;
mod x;

pub use dry_run::{DryRunClient, FixtureTimeline};
pub use x::XClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Identifier assigned to a published post.
pub type PostId = String;

/// A post read from another account's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePost {
    pub id: String,
    pub text: String,
}

/// Publishes posts and replies.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Service name for logs.
    fn name(&self) -> &str;

    /// Check credentials before the first delivery.
    async fn ensure_ready(&self) -> Result<(), DeliveryError> {
        Ok(())
    }

    /// Publish a standalone post.
    async fn post(&self, text: &str) -> Result<PostId, DeliveryError>;

    /// Publish a reply to `parent_id`.
    async fn reply(&self, text: &str, parent_id: &str) -> Result<PostId, DeliveryError>;
}

/// Reads the latest post of a monitored account.
#[async_trait]
pub trait TimelineReader: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure_ready(&self) -> Result<(), DeliveryError> {
        Ok(())
    }

    /// Most recent original post by `handle`, if it has any.
    async fn latest_post(&self, handle: &str) -> Result<Option<RemotePost>, DeliveryError>;
}
