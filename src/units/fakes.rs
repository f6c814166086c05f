//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::content::ContentGenerator;
use crate::error::{ContentError, DeliveryError, LlmError};
use crate::social::{DeliveryClient, PostId, RemotePost, TimelineReader};

/// Returns fixed text, optionally failing the first few calls.
pub struct ScriptedGenerator {
    text: String,
    failures_left: AtomicUsize,
    pub post_calls: AtomicUsize,
    pub reply_calls: AtomicUsize,
    pub previous_posts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            failures_left: AtomicUsize::new(0),
            post_calls: AtomicUsize::new(0),
            reply_calls: AtomicUsize::new(0),
            previous_posts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(self, failures: usize) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    fn next(&self) -> Result<String, ContentError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ContentError::Completion(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "boom".to_string(),
            }));
        }
        Ok(self.text.clone())
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_post(&self, previous_post: &str) -> Result<String, ContentError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        self.previous_posts
            .lock()
            .unwrap()
            .push(previous_post.to_string());
        self.next()
    }

    async fn generate_reply(
        &self,
        source_text: &str,
        _account: &str,
    ) -> Result<String, ContentError> {
        self.reply_calls.fetch_add(1, Ordering::SeqCst);
        self.next().map(|t| format!("{t} re: {source_text}"))
    }
}

/// Outcome queued for the next delivery attempt.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Ok,
    RateLimited,
    Failed,
}

/// Delivery client that plays back queued outcomes; succeeds once the queue
/// is empty.
#[derive(Default)]
pub struct ScriptedDelivery {
    outcomes: Mutex<VecDeque<Outcome>>,
    /// Every attempt as `(text, parent_id)`.
    pub attempts: Mutex<Vec<(String, Option<String>)>>,
    pub delivered: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: &[Outcome]) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    fn deliver(&self, text: &str, parent: Option<&str>) -> Result<PostId, DeliveryError> {
        let record = (text.to_string(), parent.map(str::to_string));
        self.attempts.lock().unwrap().push(record.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Ok);
        match outcome {
            Outcome::Ok => {
                let mut delivered = self.delivered.lock().unwrap();
                delivered.push(record);
                Ok(format!("sent-{}", delivered.len()))
            }
            Outcome::RateLimited => Err(DeliveryError::RateLimited {
                service: "scripted".to_string(),
                retry_after: Some(Duration::from_secs(60)),
            }),
            Outcome::Failed => Err(DeliveryError::RequestFailed {
                service: "scripted".to_string(),
                reason: "HTTP 500".to_string(),
            }),
        }
    }
}

#[async_trait]
impl DeliveryClient for ScriptedDelivery {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn post(&self, text: &str) -> Result<PostId, DeliveryError> {
        self.deliver(text, None)
    }

    async fn reply(&self, text: &str, parent_id: &str) -> Result<PostId, DeliveryError> {
        self.deliver(text, Some(parent_id))
    }
}

/// Timeline with per-handle latest posts and optional rate-limited handles.
#[derive(Default)]
pub struct ScriptedTimeline {
    posts: Mutex<HashMap<String, RemotePost>>,
    rate_limited: Mutex<Vec<String>>,
    pub lookups: Mutex<Vec<String>>,
}

impl ScriptedTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest(&self, handle: &str, id: &str, text: &str) {
        self.posts.lock().unwrap().insert(
            handle.to_string(),
            RemotePost {
                id: id.to_string(),
                text: text.to_string(),
            },
        );
    }

    pub fn rate_limit(&self, handle: &str) {
        self.rate_limited.lock().unwrap().push(handle.to_string());
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

#[async_trait]
impl TimelineReader for ScriptedTimeline {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn latest_post(&self, handle: &str) -> Result<Option<RemotePost>, DeliveryError> {
        self.lookups.lock().unwrap().push(handle.to_string());
        if self.rate_limited.lock().unwrap().iter().any(|h| h == handle) {
            return Err(DeliveryError::RateLimited {
                service: "scripted".to_string(),
                retry_after: None,
            });
        }
        Ok(self.posts.lock().unwrap().get(handle).cloned())
    }
}
