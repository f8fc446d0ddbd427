//! Error types for the brain host.

/// Top-level error type for abilities and their host.
#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    /// An ability failed while initializing or running.
    #[error("ability error: {0}")]
    Ability(String),

    /// An ability with this name is already registered.
    #[error("ability already registered: {0}")]
    AbilityExists(String),

    /// No ability with this name is registered.
    #[error("unknown ability: {0}")]
    UnknownAbility(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Host command/event contract error.
    #[error("host error: {0}")]
    Host(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BrainError>;
