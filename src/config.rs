use std::{env, str::FromStr, time::Duration};

use crate::{error::ConfigError, models::HistoryPage, replicate::ModelRef, state::OverlapPolicy};

pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_MODEL: &str = "natask/natnael_custom_model_generated:0b8fa59a19f2235347ed1c2ac5703aa2d1235ba88d3f4920008d357143ede549";
pub const DEFAULT_HISTORY_API_BASE: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: Option<String>,
    pub api_base: String,
    pub model: ModelRef,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub api_base: String,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub replicate: ReplicateConfig,
    pub history: HistoryConfig,
    pub overlap_policy: OverlapPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_raw = non_empty("REPLICATE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model = model_raw.parse::<ModelRef>()?;

        Ok(Self {
            port: parse_or(&non_empty, "PORT", 8080)?,
            replicate: ReplicateConfig {
                api_token: non_empty("REPLICATE_API_TOKEN"),
                api_base: trim_base(non_empty("REPLICATE_API_BASE").unwrap_or_else(|| DEFAULT_REPLICATE_API_BASE.to_string())),
                model,
                poll_interval: Duration::from_millis(parse_or(&non_empty, "REPLICATE_POLL_INTERVAL_MS", 1000u64)?),
            },
            history: HistoryConfig {
                api_base: trim_base(non_empty("HISTORY_API_BASE").unwrap_or_else(|| DEFAULT_HISTORY_API_BASE.to_string())),
                page_size: parse_or(&non_empty, "HISTORY_PAGE_SIZE", HistoryPage::DEFAULT_LIMIT)?.max(1),
            },
            overlap_policy: parse_or(&non_empty, "SUBMISSION_POLICY", OverlapPolicy::default())?,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

fn trim_base(base: String) -> String {
    base.trim().trim_end_matches('/').to_string()
}
