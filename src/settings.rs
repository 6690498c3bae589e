use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::slack::RetryPolicy;
use crate::{AppError, Result};

pub const SETTINGS_FILE: &str = "settings.toml";

const DEFAULT_BASE_URL: &str = "https://slack.com/api/";
const DEFAULT_PAGE_LIMIT: u32 = 200;
const DEFAULT_MAX_ATTEMPTS: u32 = 100;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    #[serde(rename = "base-url")]
    pub base_url: String,
    #[serde(rename = "page-limit")]
    pub page_limit: u32,
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
    #[serde(rename = "retry-delay-secs")]
    pub retry_delay_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::TomlParse(e.to_string()))
    }
}

impl ApiSettings {
    /// Base URL with a trailing slash so endpoint names join under it.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| AppError::InvalidUrl(format!("{}: {}", self.base_url, e)))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}
