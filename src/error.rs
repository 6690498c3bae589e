use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("no token given: pass --token or set SLACK_TOKEN")]
    MissingToken,

    #[error("invalid Slack token: {0}")]
    InvalidToken(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Slack API error on {endpoint}: {code}")]
    SlackApi { endpoint: String, code: String },

    #[error("Slack rate limit on {endpoint}: gave up after {attempts} attempts")]
    SlackRateLimit { endpoint: String, attempts: u32 },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
