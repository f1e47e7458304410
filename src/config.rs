use crate::error::{ImagingError, Result};
use crate::raycast::MAX_STEPS;

use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};

/// Runtime settings for the viewer and its backend connection.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub auth_scheme: String,
    pub request_timeout_secs: u64,
    pub debounce_ms: u64,
    pub volume_target_size: u32,
    pub step_count: u32,
    pub threshold: f32,
    pub opacity: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            auth_token: None,
            auth_scheme: "Token".to_string(),
            request_timeout_secs: 30,
            debounce_ms: 100,
            volume_target_size: 128,
            step_count: 128,
            threshold: 0.2,
            opacity: 1.0,
        }
    }
}

impl ViewerConfig {
    /// Defaults overridden by `IMAGING_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = env::var("IMAGING_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(token) = env::var("IMAGING_TOKEN") {
            config.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Ok(scheme) = env::var("IMAGING_AUTH_SCHEME") {
            config.auth_scheme = scheme;
        }
        if let Some(ms) = parse_var("IMAGING_DEBOUNCE_MS")? {
            config.debounce_ms = ms;
        }
        if let Some(size) = parse_var("IMAGING_VOLUME_SIZE")? {
            config.volume_target_size = size;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|err| ImagingError::Config(format!("{}: {err}", path.as_ref().display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(ImagingError::Config("api_base_url is empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ImagingError::Config("request_timeout_secs must be > 0".into()));
        }
        if self.volume_target_size == 0 {
            return Err(ImagingError::Config("volume_target_size must be > 0".into()));
        }
        if self.step_count == 0 || self.step_count > MAX_STEPS {
            return Err(ImagingError::Config(format!(
                "step_count must be in 1..={MAX_STEPS}"
            )));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ImagingError::Config(format!("{name} is not a valid number: `{raw}`"))),
        Err(_) => Ok(None),
    }
}
