use anyhow::{Context, Result};

const DEFAULT_INFERENCE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_INFERENCE_MODEL: &str = "claude-sonnet-4-5";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub inference_api_url: String,
    pub inference_api_key: String,
    pub inference_model: String,
    pub inference_timeout_secs: u64,
    pub image_fetch_timeout_secs: u64,
    pub max_image_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            inference_api_url: optional_env("INFERENCE_API_URL", DEFAULT_INFERENCE_API_URL),
            inference_api_key: require_env("INFERENCE_API_KEY")?,
            inference_model: optional_env("INFERENCE_MODEL", DEFAULT_INFERENCE_MODEL),
            inference_timeout_secs: parse_env("INFERENCE_TIMEOUT_SECS", 120)?,
            image_fetch_timeout_secs: parse_env("IMAGE_FETCH_TIMEOUT_SECS", 30)?,
            max_image_bytes: parse_env("MAX_IMAGE_BYTES", 10 * 1024 * 1024)?,
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
