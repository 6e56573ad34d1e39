use thiserror::Error;

pub type Result<T> = core::result::Result<T, ThreadlineError>;

#[derive(Error, Debug)]
pub enum ThreadlineError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ThreadlineError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ThreadlineError::Other(anyhow::anyhow!(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThreadlineError::Configuration("bad value".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad value");

        let err = ThreadlineError::ChannelClosed;
        assert_eq!(err.to_string(), "Event channel closed");
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ThreadlineError = serde_err.into();
        assert!(matches!(err, ThreadlineError::SerializationError(_)));
    }

    #[test]
    fn test_from_boxed_error() {
        let boxed: Box<dyn std::error::Error + Send + Sync> = "boom".into();
        let err: ThreadlineError = boxed.into();
        assert!(err.to_string().contains("boom"));
    }
}
