pub mod cli;
pub mod commands;
pub mod emoji;
pub mod error;
pub mod report;
pub mod settings;
pub mod slack;
pub mod types;
pub mod walker;

pub use cli::Cli;
pub use error::{AppError, Result};

const TOKEN_ENV: &str = "SLACK_TOKEN";

pub fn load_token() -> Result<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or(AppError::MissingToken)
}
