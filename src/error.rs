//! Error types for the MSC resolver bot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Failures while looking up a proposal on the issue tracker.
///
/// Every variant is a fetch failure: it aborts handling of the whole
/// message. An issue without the proposal label is not an error.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Request for issue {id} failed: {reason}")]
    Fetch { id: String, reason: String },

    #[error("Issue tracker returned {status} for issue {id}")]
    Status { id: String, status: u16 },

    #[error("Invalid response for issue {id}: {reason}")]
    Decode { id: String, reason: String },
}

impl ResolveError {
    /// The proposal identifier the failed lookup was for.
    pub fn id(&self) -> &str {
        match self {
            Self::Fetch { id, .. } | Self::Status { id, .. } | Self::Decode { id, .. } => id,
        }
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
