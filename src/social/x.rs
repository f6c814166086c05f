//! X API v2 client.
//!
//! Publishing uses an OAuth 2.0 user-context token; timeline reads use the
//! app-only bearer token. A 429 is reported as `RateLimited` with the wait
//! derived from `x-rate-limit-reset`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::SocialConfig;
use crate::error::DeliveryError;
use crate::social::{DeliveryClient, PostId, RemotePost, TimelineReader};

const SERVICE: &str = "x";
/// Page size bounds accepted by the user timeline endpoint.
const MIN_PAGE: usize = 5;
const MAX_PAGE: usize = 100;

/// X API v2 client. Caches handle to user id lookups.
pub struct XClient {
    client: Client,
    config: SocialConfig,
    user_ids: Mutex<HashMap<String, String>>,
}

impl XClient {
    pub fn new(config: SocialConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config,
            user_ids: Mutex::new(HashMap::new()),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/2/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn token(secret: Option<&SecretString>, name: &str) -> Result<String, DeliveryError> {
        secret
            .map(|s| s.expose_secret().to_string())
            .ok_or_else(|| DeliveryError::NotConfigured {
                reason: format!("{} is not set", name),
            })
    }

    fn user_token(&self) -> Result<String, DeliveryError> {
        Self::token(self.config.user_access_token.as_ref(), "X_USER_ACCESS_TOKEN")
    }

    fn bearer_token(&self) -> Result<String, DeliveryError> {
        Self::token(self.config.bearer_token.as_ref(), "X_BEARER_TOKEN")
    }

    async fn send<R: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<R, DeliveryError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("X API request failed: {}", e);
            DeliveryError::RequestFailed {
                service: SERVICE.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        let retry_after = rate_limit_reset(response.headers(), chrono::Utc::now().timestamp());
        let response_text = response.text().await.unwrap_or_default();

        tracing::debug!("X API response status: {}", status);

        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => DeliveryError::AuthFailed {
                    service: SERVICE.to_string(),
                },
                429 => DeliveryError::RateLimited {
                    service: SERVICE.to_string(),
                    retry_after,
                },
                _ => DeliveryError::RequestFailed {
                    service: SERVICE.to_string(),
                    reason: format!("HTTP {}: {}", status, response_text),
                },
            });
        }

        serde_json::from_str(&response_text).map_err(|e| DeliveryError::InvalidResponse {
            service: SERVICE.to_string(),
            reason: format!("JSON parse error: {}. Raw: {}", e, response_text),
        })
    }

    async fn create_tweet(&self, body: CreateTweet<'_>) -> Result<PostId, DeliveryError> {
        let token = self.user_token()?;
        let request = self
            .client
            .post(self.api_url("tweets"))
            .bearer_auth(token)
            .json(&body);
        let created: DataEnvelope<TweetData> = self.send(request).await?;
        created
            .data
            .map(|tweet| tweet.id)
            .ok_or_else(|| DeliveryError::InvalidResponse {
                service: SERVICE.to_string(),
                reason: "create tweet response has no data".to_string(),
            })
    }

    /// Up to `limit` recent original posts by `handle`, newest first.
    ///
    /// Follows `next_token` pagination until `limit` is reached or the
    /// timeline runs out. Errors, including rate limits, end the export.
    pub async fn recent_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<RemotePost>, DeliveryError> {
        let mut posts = Vec::new();
        if limit == 0 {
            return Ok(posts);
        }

        let user_id = self.user_id(handle).await?;
        let mut next_token: Option<String> = None;

        while posts.len() < limit {
            let page_size = (limit - posts.len()).clamp(MIN_PAGE, MAX_PAGE);
            let mut query = vec![
                ("max_results", page_size.to_string()),
                ("exclude", "retweets,replies".to_string()),
            ];
            if let Some(token) = next_token.take() {
                query.push(("pagination_token", token));
            }

            let request = self
                .client
                .get(self.api_url(&format!("users/{}/tweets", user_id)))
                .query(&query)
                .bearer_auth(self.bearer_token()?);
            let page: TimelinePage = self.send(request).await?;

            let fetched = page.data.unwrap_or_default();
            if fetched.is_empty() {
                break;
            }
            posts.extend(fetched.into_iter().map(|t| RemotePost {
                id: t.id,
                text: t.text,
            }));
            tracing::debug!("Fetched {} post(s) from @{}", posts.len(), handle);

            match page.meta.and_then(|m| m.next_token) {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        posts.truncate(limit);
        Ok(posts)
    }

    async fn user_id(&self, handle: &str) -> Result<String, DeliveryError> {
        if let Some(id) = self.user_ids.lock().await.get(handle) {
            return Ok(id.clone());
        }

        let request = self
            .client
            .get(self.api_url(&format!("users/by/username/{}", handle)))
            .bearer_auth(self.bearer_token()?);
        let user: DataEnvelope<UserData> = self.send(request).await?;
        let id = user
            .data
            .map(|u| u.id)
            .ok_or_else(|| DeliveryError::RequestFailed {
                service: SERVICE.to_string(),
                reason: format!("user @{} not found", handle),
            })?;

        self.user_ids
            .lock()
            .await
            .insert(handle.to_string(), id.clone());
        Ok(id)
    }
}

#[async_trait]
impl DeliveryClient for XClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn ensure_ready(&self) -> Result<(), DeliveryError> {
        self.user_token().map(|_| ())
    }

    async fn post(&self, text: &str) -> Result<PostId, DeliveryError> {
        self.create_tweet(CreateTweet { text, reply: None }).await
    }

    async fn reply(&self, text: &str, parent_id: &str) -> Result<PostId, DeliveryError> {
        self.create_tweet(CreateTweet {
            text,
            reply: Some(ReplyTo {
                in_reply_to_tweet_id: parent_id,
            }),
        })
        .await
    }
}

#[async_trait]
impl TimelineReader for XClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn ensure_ready(&self) -> Result<(), DeliveryError> {
        self.bearer_token().map(|_| ())
    }

    async fn latest_post(&self, handle: &str) -> Result<Option<RemotePost>, DeliveryError> {
        let user_id = self.user_id(handle).await?;
        let request = self
            .client
            .get(self.api_url(&format!("users/{}/tweets", user_id)))
            .query(&[("max_results", "5"), ("exclude", "retweets,replies")])
            .bearer_auth(self.bearer_token()?);

        let timeline: DataEnvelope<Vec<TweetData>> = self.send(request).await?;
        Ok(timeline
            .data
            .and_then(|tweets| tweets.into_iter().next())
            .map(|t| RemotePost {
                id: t.id,
                text: t.text,
            }))
    }
}

/// Wait implied by `x-rate-limit-reset` (epoch seconds) relative to `now`.
fn rate_limit_reset(headers: &reqwest::header::HeaderMap, now: i64) -> Option<Duration> {
    let reset = headers
        .get("x-rate-limit-reset")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())?;
    Some(Duration::from_secs(reset.saturating_sub(now).max(0) as u64))
}

#[derive(Debug, Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyTo<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplyTo<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct TimelinePage {
    data: Option<Vec<TweetData>>,
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}
