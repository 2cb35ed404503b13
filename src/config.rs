use std::env;
use std::fs;

use anyhow::{anyhow, Context, Result};

use crate::generator::ProviderSettings;
use crate::guards::{parse_guard_order, GuardConfig};

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub max_bytes: Option<u64>,
    pub keep: usize,
    pub compress: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` when `ANTHROPIC_API_KEY` is unset or empty.
    pub provider: Option<ProviderSettings>,
    pub guard_config: GuardConfig,
    pub guard_order: Vec<String>,
    pub record_log_file: Option<String>,
    pub rotation: RotationConfig,
    pub max_request_bytes: Option<usize>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut guard_config = if let Ok(path) = env::var("QUIZGATE_GUARD_CONFIG") {
            let content = fs::read_to_string(&path).with_context(|| {
                format!(
                    "Failed to read QUIZGATE_GUARD_CONFIG '{}': file unreadable",
                    path
                )
            })?;
            serde_json::from_str::<GuardConfig>(&content).with_context(|| {
                format!(
                    "Failed to parse QUIZGATE_GUARD_CONFIG '{}': invalid JSON configuration",
                    path
                )
            })?
        } else {
            GuardConfig::default()
        };
        if let Some(max) = parse_optional_u64("QUIZGATE_RATE_LIMIT_MAX")? {
            guard_config.rate_limit_max = u32::try_from(max)
                .map_err(|_| anyhow!("QUIZGATE_RATE_LIMIT_MAX is out of range"))?;
        }
        if let Some(secs) = parse_optional_u64("QUIZGATE_RATE_LIMIT_WINDOW_SECS")? {
            guard_config.rate_limit_window_secs = secs;
        }
        if guard_config.rate_limit_window_secs == 0 {
            return Err(anyhow!("rate limit window must be at least one second"));
        }

        let guard_order = parse_guard_order();

        let provider = match env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let mut settings = ProviderSettings::new(key.trim());
                if let Some(url) = non_empty_var("QUIZGATE_PROVIDER_URL") {
                    settings.endpoint = url;
                }
                if let Some(model) = non_empty_var("QUIZGATE_MODEL") {
                    settings.model = model;
                }
                if let Some(tokens) = parse_optional_u64("QUIZGATE_MAX_TOKENS")? {
                    settings.max_tokens = u32::try_from(tokens)
                        .ok()
                        .filter(|t| *t > 0)
                        .ok_or_else(|| anyhow!("QUIZGATE_MAX_TOKENS is out of range"))?;
                }
                Some(settings)
            }
            _ => None,
        };

        let record_log_file = non_empty_var("RECORD_LOG_FILE");

        let rotation = RotationConfig {
            max_bytes: parse_optional_u64("LOG_MAX_BYTES")?,
            keep: parse_optional_u64("LOG_ROTATE_KEEP")?.unwrap_or(1) as usize,
            compress: parse_bool_env("LOG_ROTATE_COMPRESS")?.unwrap_or(false),
        };

        let max_request_bytes =
            parse_optional_u64("QUIZGATE_MAX_REQUEST_BYTES")?.map(|v| v as usize);

        Ok(Self {
            provider,
            guard_config,
            guard_order,
            record_log_file,
            rotation,
            max_request_bytes,
        })
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
