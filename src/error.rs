//! Error types for Pet Assist.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
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

    #[error("Failed to download media on channel {name}: {reason}")]
    DownloadFailed { name: String, reason: String },
}

/// Raw model-service errors, before the router normalizes them.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out: {reason}")]
    Timeout { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} quota exhausted")]
    QuotaExceeded { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} rejected the image: {reason}")]
    InvalidImage { provider: String, reason: String },

    #[error("Model {model} not available on provider {provider}")]
    ModelNotAvailable { provider: String, model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether resending the same content in another form could succeed.
    ///
    /// Auth and quota failures fail the same way regardless of payload.
    pub fn is_payload_related(&self) -> bool {
        !matches!(self, Self::AuthFailed { .. } | Self::QuotaExceeded { .. })
    }
}

/// Image decode / re-encode errors.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image worker failed: {0}")]
    Worker(String),
}

/// Normalized outcome of a failed backend call.
///
/// This is the only failure type that crosses the router boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendFailure {
    #[error("model service timed out: {0}")]
    RemoteTimeout(String),

    #[error("model service rejected the request: {0}")]
    RemoteRejected(String),

    #[error("model service quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("image could not be processed: {0}")]
    MalformedImage(String),

    #[error("modality not supported: {0}")]
    UnsupportedModality(String),

    #[error("unexpected backend failure: {0}")]
    Unknown(String),
}

impl From<LlmError> for BackendFailure {
    fn from(err: LlmError) -> Self {
        let detail = err.to_string();
        match err {
            LlmError::Timeout { .. } => Self::RemoteTimeout(detail),
            LlmError::QuotaExceeded { .. } => Self::QuotaExceeded(detail),
            LlmError::RateLimited { .. }
            | LlmError::AuthFailed { .. }
            | LlmError::ModelNotAvailable { .. } => Self::RemoteRejected(detail),
            LlmError::InvalidImage { .. } => Self::MalformedImage(detail),
            LlmError::RequestFailed { .. }
            | LlmError::InvalidResponse { .. }
            | LlmError::Json(_) => Self::Unknown(detail),
        }
    }
}

impl From<ImageError> for BackendFailure {
    fn from(err: ImageError) -> Self {
        Self::MalformedImage(err.to_string())
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_error_wraps_subsystems() {
        let err: Error = ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()).into();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));

        let err: Error = LlmError::AuthFailed {
            provider: "openai".into(),
        }
        .into();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[test]
    fn timeout_maps_to_remote_timeout() {
        let failure = BackendFailure::from(LlmError::Timeout {
            provider: "openai".into(),
            reason: "deadline".into(),
        });
        assert!(matches!(failure, BackendFailure::RemoteTimeout(_)));
    }

    #[test]
    fn quota_and_rejections_are_distinct() {
        let quota = BackendFailure::from(LlmError::QuotaExceeded {
            provider: "openai".into(),
        });
        assert!(matches!(quota, BackendFailure::QuotaExceeded(_)));

        let limited = BackendFailure::from(LlmError::RateLimited {
            provider: "openai".into(),
            retry_after: None,
        });
        assert!(matches!(limited, BackendFailure::RemoteRejected(_)));
    }

    #[test]
    fn rejected_image_maps_to_malformed_image() {
        let failure = BackendFailure::from(LlmError::InvalidImage {
            provider: "openai".into(),
            reason: "could not download".into(),
        });
        assert!(matches!(failure, BackendFailure::MalformedImage(_)));

        let failure = BackendFailure::from(ImageError::Decode("bad header".into()));
        assert!(matches!(failure, BackendFailure::MalformedImage(_)));
    }

    #[test]
    fn transport_errors_map_to_unknown() {
        let failure = BackendFailure::from(LlmError::RequestFailed {
            provider: "openai".into(),
            reason: "connection reset".into(),
        });
        assert!(matches!(failure, BackendFailure::Unknown(_)));
    }

    #[test]
    fn auth_and_quota_are_not_payload_related() {
        assert!(!LlmError::AuthFailed { provider: "x".into() }.is_payload_related());
        assert!(!LlmError::QuotaExceeded { provider: "x".into() }.is_payload_related());
        assert!(
            LlmError::InvalidImage {
                provider: "x".into(),
                reason: "fetch".into()
            }
            .is_payload_related()
        );
    }
}
