//! Error types for rule configuration.

use thiserror::Error;

/// Errors raised while registering rate limit rules.
///
/// These only occur during configuration, before traffic is evaluated.
/// Evaluation itself never fails: a request that yields no usable criteria
/// for a rule is treated as not constrained by that rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The rule label was empty or contained only whitespace.
    #[error("label is missing or blank")]
    MissingLabel,

    /// A rule with the same label is already registered.
    #[error("duplicated label: {0}")]
    DuplicateLabel(String),

    /// The window_size was zero.
    #[error("window_size must be a positive number of seconds")]
    InvalidWindowSize,

    /// The rate_limit was zero.
    #[error("rate_limit must be a positive count")]
    InvalidRateLimit,
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
