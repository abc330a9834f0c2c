use std::{env, net::SocketAddr, path::PathBuf};

use dotenvy::dotenv;
use url::Url;

use crate::session::ScorePolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("NGROK_URL and NGROK_ADDR must be set together")]
    PartialWebhook,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: Url,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub teloxide_token: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub questions_path: PathBuf,
    pub log_level: String,
    pub score_policy: ScorePolicy,
    /// Webhook mode when set, long polling otherwise.
    pub webhook: Option<WebhookConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| lookup(name).filter(|value| !value.is_empty());

        let webhook = match (get("NGROK_URL"), get("NGROK_ADDR")) {
            (Some(url), Some(addr)) => Some(WebhookConfig {
                url: parse("NGROK_URL", &url)?,
                addr: parse("NGROK_ADDR", &addr)?,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialWebhook),
        };

        let score_policy = match get("RESET_SCORE_ON_START") {
            Some(raw) if parse_bool("RESET_SCORE_ON_START", &raw)? => ScorePolicy::ResetOnStart,
            _ => ScorePolicy::CarryOver,
        };

        Ok(Self {
            teloxide_token: get("TELOXIDE_TOKEN").ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://quiz.db".to_owned()),
            database_max_connections: get("DATABASE_MAX_CONNECTIONS")
                .map(|raw| parse("DATABASE_MAX_CONNECTIONS", &raw))
                .transpose()?
                .unwrap_or(4),
            questions_path: get("QUESTIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/questions.json")),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            score_policy,
            webhook,
        })
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}
