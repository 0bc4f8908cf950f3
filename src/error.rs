//! Defines the application's primary error type `AppError` and a convenience `Result` alias.
//!
//! Uses the `thiserror` crate for ergonomic error definition and provides `From`
//! implementations to convert common external errors into `AppError` variants.
//! Errors that do not implement `Clone` are wrapped in `Arc` to allow `AppError` to be cloneable.

use std::sync::Arc;
use thiserror::Error;

/// The primary error enumeration for all application-specific errors.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Transport-level failure talking to the exchange (`reqwest`).
    #[error("API Error: {0}")]
    Api(Arc<reqwest::Error>),

    /// The exchange answered with its own error object.
    #[error("Binance error {code}: {msg}")]
    Exchange { code: i64, msg: String },

    /// Market data could not be fetched or made sense of.
    #[error("{0}")]
    Data(String),

    /// Signed endpoints were requested without credentials.
    #[error("Auth Error: {0}")]
    Auth(String),

    /// Error during JSON parsing (`serde_json`). Wrapped in Arc as serde_json::Error is not Clone.
    #[error("JSON Parsing Error: {0}")]
    JsonParse(Arc<serde_json::Error>),

    /// Error specific to CLI logic or argument handling.
    #[error("CLI Error: {0}")]
    Cli(String),

    /// Error originating from user interaction prompts (`dialoguer`).
    #[error("Dialoguer Error: {0}")]
    Dialoguer(Arc<dialoguer::Error>),

    /// Error related to progress bar style templating (`indicatif`).
    #[error("Progress Style Template Error: {0}")]
    Template(Arc<indicatif::style::TemplateError>),
}

/// A specialized `Result` type using the application's `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Replaces every non-ASCII character with `?`.
///
/// Exchange messages and transport errors end up on consoles that may only
/// speak ASCII, so everything surfaced from the network goes through here.
pub fn ascii_safe(text: impl AsRef<str>) -> String {
    text.as_ref()
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

// --- From implementations ---

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Api(Arc::new(err))
    }
}

impl From<dialoguer::Error> for AppError {
    fn from(err: dialoguer::Error) -> Self {
        AppError::Dialoguer(Arc::new(err))
    }
}

impl From<indicatif::style::TemplateError> for AppError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        AppError::Template(Arc::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonParse(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_safe_replaces_non_ascii() {
        assert_eq!(ascii_safe("Gebühr → 0.1%"), "Geb?hr ? 0.1%");
        assert_eq!(ascii_safe("plain"), "plain");
    }

    #[test]
    fn exchange_error_formats_code_and_message() {
        let err = AppError::Exchange {
            code: -1121,
            msg: "Invalid symbol.".to_string(),
        };
        assert_eq!(err.to_string(), "Binance error -1121: Invalid symbol.");
    }
}
