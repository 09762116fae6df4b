use std::env;

use anyhow::{anyhow, Result};

/// Default base URL of the OpenAI-compatible completion API.
pub const DEFAULT_PROVIDER_URL: &str = "https://api.groq.com/openai/v1";
/// Credential variable names, checked in order. The lower-case twin is kept
/// for deployments that export it that way.
pub const API_KEY_VARS: [&str; 2] = ["GROQ_API_KEY", "groq_api_key"];

const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;
const DEFAULT_RATE_LIMIT_MAX: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;

/// Deployment flavour. Controls whether internal error detail reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn exposes_error_detail(self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub provider_url: String,
    pub max_request_bytes: usize,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    pub environment: Environment,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            environment: Environment::Production,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = API_KEY_VARS
            .iter()
            .filter_map(|name| env::var(name).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty());

        let provider_url = env::var("VERDICT_PROVIDER_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());

        let max_request_bytes = parse_optional_u64("VERDICT_MAX_REQUEST_BYTES")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
        let rate_limit_max = match parse_optional_u64("VERDICT_RATE_LIMIT_MAX")? {
            Some(v) => u32::try_from(v)
                .map_err(|_| anyhow!("VERDICT_RATE_LIMIT_MAX is out of range"))?,
            None => DEFAULT_RATE_LIMIT_MAX,
        };
        let rate_limit_window_ms = parse_optional_u64("VERDICT_RATE_LIMIT_WINDOW_MS")?
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_MS);
        let environment = parse_environment("VERDICT_ENV")?.unwrap_or_default();

        Ok(Self {
            api_key,
            provider_url,
            max_request_bytes,
            rate_limit_max,
            rate_limit_window_ms,
            environment,
        })
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => match value.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(anyhow!("{} must be a positive integer", var)),
            Ok(v) => Ok(Some(v)),
        },
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_environment(var: &str) -> Result<Option<Environment>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            match value.trim().to_ascii_lowercase().as_str() {
                "development" | "dev" | "local" => Ok(Some(Environment::Development)),
                "production" | "prod" => Ok(Some(Environment::Production)),
                _ => Err(anyhow!("{} must be one of development/production", var)),
            }
        }
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
