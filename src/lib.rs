//! postclaw: an autonomous social posting agent.
//!
//! A fixed-interval tick loop drives a set of core units. Each unit keeps
//! its own registry of scheduled posts or replies, generates their text
//! lazily through an LLM and delivers them when due, backing off after
//! failures. A heartbeat lock file keeps a single instance running.

pub mod agent;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod llm;
pub mod social;
pub mod units;

pub use config::Config;
pub use error::{Error, Result};
