//! Custom error types for bibharvest.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, HarvestError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for bibharvest operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Browser automation error (headless Chrome)
    #[error("Browser error: {0}")]
    Browser(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP response with a failure status
    #[error("HTTP error: {code} for {url}")]
    Http {
        /// Response status code
        code: u16,
        /// Requested URL
        url: String,
    },

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// External citation tool failed for one identifier
    #[error("Citation tool failed for {id}: {stderr}")]
    Subprocess {
        /// Paper identifier the tool was invoked with
        id: String,
        /// Diagnostic text from the tool's standard error
        stderr: String,
    },

    /// An operation exceeded its deadline
    #[error("Timed out after {0}s: {1}")]
    Timeout(u64, String),

    /// CAPTCHA detected on a results page
    #[error("CAPTCHA detected, aborting this run")]
    Captcha,

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `HarvestError`
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| HarvestError::Parse(msg.to_string()))
    }
}
