//! Configuration for postclaw.
//!
//! Everything is read from the process environment (after `.env` has been
//! loaded by `dotenvy` in `main`). Each subsystem gets its own typed config
//! so units only see what they need.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::agent::BackoffPolicy;
use crate::error::ConfigError;

/// Main configuration for the agent.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent: AgentConfig,
    pub schedule: SchedulePolicy,
    pub llm: LlmConfig,
    pub social: SocialConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent = AgentConfig::from_env()?;
        let mut schedule = if agent.debugging {
            SchedulePolicy::debugging()
        } else {
            SchedulePolicy::production()
        };
        let tick_ms: u64 =
            parse_optional_env("TICK_INTERVAL_MS", schedule.tick_interval.as_millis() as u64)?;
        if tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TICK_INTERVAL_MS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        schedule.tick_interval = Duration::from_millis(tick_ms);
        schedule.external_call_timeout = Duration::from_secs(parse_optional_env(
            "EXTERNAL_CALL_TIMEOUT_SECS",
            schedule.external_call_timeout.as_secs(),
        )?);
        schedule.backoff.max_retries =
            parse_optional_env("MAX_SEND_RETRIES", schedule.backoff.max_retries)?;
        if schedule.backoff.max_retries < 1 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_SEND_RETRIES".to_string(),
                message: "must be at least 1, otherwise every action is abandoned unsent"
                    .to_string(),
            });
        }

        Ok(Self {
            agent,
            schedule,
            llm: LlmConfig::from_env()?,
            social: SocialConfig::from_env()?,
        })
    }
}

/// Process-level settings: file locations and the debugging toggle.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Shortens every delay and suppresses real delivery calls.
    pub debugging: bool,
    /// Heartbeat lock file; its presence means an instance is running.
    pub heartbeat_path: PathBuf,
    /// JSON file listing the cores to load.
    pub registry_path: PathBuf,
    /// Directory for the append-only event log.
    pub log_dir: PathBuf,
    /// Directory holding personality and target-account files.
    pub config_dir: PathBuf,
    /// Directory holding source content, lore and debugging fixtures.
    pub data_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            debugging: false,
            heartbeat_path: PathBuf::from("agent.heartbeat"),
            registry_path: PathBuf::from("config/cores.json"),
            log_dir: PathBuf::from("log"),
            config_dir: PathBuf::from("config"),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl AgentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            debugging: parse_flag(optional_env("DEBUGGING")?.as_deref()),
            heartbeat_path: optional_env("HEARTBEAT_FILE")?
                .map(PathBuf::from)
                .unwrap_or(defaults.heartbeat_path),
            registry_path: optional_env("CORE_REGISTRY")?
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path),
            log_dir: optional_env("LOG_DIR")?
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            config_dir: optional_env("CONFIG_DIR")?
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
            data_dir: optional_env("DATA_DIR")?
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        })
    }

    /// Path of the personality description used in prompts.
    pub fn personality_path(&self) -> PathBuf {
        self.config_dir.join("agent_personality.json")
    }

    /// Path of the monitored account list.
    pub fn target_accounts_path(&self) -> PathBuf {
        self.config_dir.join("target_accounts.json")
    }

    /// Path of the canned timeline used by the replier in debugging mode.
    pub fn reply_fixture_path(&self) -> PathBuf {
        self.data_dir.join("reply_testingdata.json")
    }
}

/// How the poster picks the delay before its next post.
#[derive(Debug, Clone, PartialEq)]
pub enum PostDelay {
    /// Normally distributed delay in minutes, clamped to `[min, max]`.
    Normal {
        mean_minutes: f64,
        std_dev_minutes: f64,
        min_minutes: i64,
        max_minutes: i64,
    },
    /// Always the same delay.
    Fixed(Duration),
}

/// Timing constants for the scheduling core.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    /// Target length of one tick.
    pub tick_interval: Duration,
    /// Delay before a newly scheduled post becomes due.
    pub post_delay: PostDelay,
    /// How often the replier polls monitored accounts.
    pub reply_check_interval: Duration,
    /// Minimum spacing between two scheduled replies.
    pub reply_spacing: Duration,
    /// Minimum lead time between detecting a post and replying to it.
    pub reply_lead: Duration,
    /// How often the diagnostic core logs a liveness line.
    pub diagnostic_interval: Duration,
    /// Upper bound for any single LLM or delivery call inside a tick.
    pub external_call_timeout: Duration,
    /// Retry policy for failed deliveries.
    pub backoff: BackoffPolicy,
}

impl SchedulePolicy {
    /// Production timings.
    pub fn production() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            post_delay: PostDelay::Normal {
                mean_minutes: 25.0,
                std_dev_minutes: 10.0,
                min_minutes: 5,
                max_minutes: 80,
            },
            reply_check_interval: Duration::from_secs(90 * 60),
            reply_spacing: Duration::from_secs(10 * 60),
            reply_lead: Duration::from_secs(60),
            diagnostic_interval: Duration::from_secs(30),
            external_call_timeout: Duration::from_secs(60),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Shortened timings for local iteration.
    pub fn debugging() -> Self {
        Self {
            post_delay: PostDelay::Fixed(Duration::from_secs(60)),
            reply_check_interval: Duration::from_secs(15),
            reply_spacing: Duration::from_secs(10),
            ..Self::production()
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_post_delay(mut self, delay: PostDelay) -> Self {
        self.post_delay = delay;
        self
    }

    pub fn with_reply_spacing(mut self, spacing: Duration) -> Self {
        self.reply_spacing = spacing;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.backoff.max_retries = max_retries;
        self
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::production()
    }
}

/// Which LLM backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderType {
    /// OpenAI-compatible chat completions API.
    OpenAi,
    /// Replicate predictions API.
    Replicate,
}

impl FromStr for LlmProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "replicate" => Ok(Self::Replicate),
            other => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                message: format!("unsupported provider '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for LlmProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Replicate => write!(f, "replicate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: Option<SecretString>,
    /// Model version identifier (`owner/name:version` or bare version hash).
    pub model_version: String,
    pub base_url: String,
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderType,
    pub openai: OpenAiConfig,
    pub replicate: ReplicateConfig,
}

impl LlmConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let provider = optional_env("LLM_PROVIDER")?
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(LlmProviderType::OpenAi);

        let model_version = optional_env("REPLICATE_MODEL_VERSION")?;
        if provider == LlmProviderType::Replicate && model_version.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "REPLICATE_MODEL_VERSION".to_string(),
            ));
        }

        Ok(Self {
            provider,
            openai: OpenAiConfig {
                api_key: optional_env("OPENAI_API_KEY")?.map(SecretString::from),
                model: optional_env("LLM_MODEL")?.unwrap_or_else(|| "gpt-4o".to_string()),
                base_url: optional_env("OPENAI_BASE_URL")?
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
            },
            replicate: ReplicateConfig {
                api_token: optional_env("REPLICATE_API_TOKEN")?.map(SecretString::from),
                model_version: model_version.unwrap_or_default(),
                base_url: optional_env("REPLICATE_BASE_URL")?
                    .unwrap_or_else(|| "https://api.replicate.com".to_string()),
            },
        })
    }

    /// Model identity for the configured provider.
    pub fn model(&self) -> &str {
        match self.provider {
            LlmProviderType::OpenAi => &self.openai.model,
            LlmProviderType::Replicate => &self.replicate.model_version,
        }
    }
}

/// Social network API configuration.
#[derive(Debug, Clone)]
pub struct SocialConfig {
    pub base_url: String,
    /// OAuth 2.0 user-context token, required to publish.
    pub user_access_token: Option<SecretString>,
    /// App-only bearer token, required to read timelines.
    pub bearer_token: Option<SecretString>,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.x.com".to_string(),
            user_access_token: None,
            bearer_token: None,
        }
    }
}

impl SocialConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: optional_env("X_API_BASE_URL")?
                .unwrap_or_else(|| Self::default().base_url),
            user_access_token: optional_env("X_USER_ACCESS_TOKEN")?.map(SecretString::from),
            bearer_token: optional_env("X_BEARER_TOKEN")?.map(SecretString::from),
        })
    }
}

fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("failed to read: {}", e),
        }),
    }
}

fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}

/// Interpret a boolean-ish environment toggle.
fn parse_flag(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !matches!(v.trim().to_lowercase().as_str(), "" | "0" | "false" | "no" | "off"),
    }
}
