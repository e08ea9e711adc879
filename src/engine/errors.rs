//! Error handling for the enforcement engine

use std::error::Error;
use std::fmt;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error types
#[derive(Debug)]
pub enum EngineError {
    /// A URL could not be parsed
    UrlParse {
        url: String,
        source: url::ParseError,
    },

    /// A lock target was not a usable URL or domain
    InvalidTarget(String),

    /// A lock was requested while another lock is active
    AlreadyLocked { locked_domain: String },

    /// A tab action could not be applied (tab gone, platform error)
    ActionFailed {
        tab_id: i64,
        source: Box<dyn Error + Send + Sync>,
    },

    /// The remote rules endpoint could not be fetched or parsed
    RemoteFetch(String),

    /// Serialization/deserialization error
    Serialization(serde_json::Error),

    /// IO error
    Io(std::io::Error),

    /// Invalid configuration
    InvalidConfiguration(String),

    /// Custom error
    Custom(String),
}

impl EngineError {
    /// Create a URL parse error
    pub fn url_parse(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::UrlParse {
            url: url.into(),
            source,
        }
    }

    /// Create an invalid lock target error
    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget(message.into())
    }

    /// Create an action failure error
    pub fn action_failed(tab_id: i64, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::ActionFailed {
            tab_id,
            source: source.into(),
        }
    }

    /// Create a remote fetch error
    pub fn remote_fetch(message: impl Into<String>) -> Self {
        Self::RemoteFetch(message.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Create a custom error
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlParse { url, source } => write!(f, "Failed to parse URL '{}': {}", url, source),
            Self::InvalidTarget(msg) => write!(f, "Invalid lock target: {}", msg),
            Self::AlreadyLocked { locked_domain } => {
                write!(f, "A lock on '{}' is already active; unlock first", locked_domain)
            }
            Self::ActionFailed { tab_id, source } => {
                write!(f, "Action on tab {} failed: {}", tab_id, source)
            }
            Self::RemoteFetch(msg) => write!(f, "Remote rules fetch failed: {}", msg),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UrlParse { source, .. } => Some(source),
            Self::ActionFailed { source, .. } => Some(source.as_ref() as &(dyn Error + 'static)),
            Self::Serialization(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::AlreadyLocked {
            locked_domain: "khanacademy.org".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "A lock on 'khanacademy.org' is already active; unlock first"
        );

        let err = EngineError::invalid_target("not-a-url");
        assert_eq!(err.to_string(), "Invalid lock target: not-a-url");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let engine_err: EngineError = json_err.into();
        assert!(matches!(engine_err, EngineError::Serialization(_)));
    }

    #[test]
    fn test_action_failed_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "tab gone");
        let err = EngineError::action_failed(42, io);
        assert!(err.to_string().contains("tab 42"));
        assert!(err.source().is_some());
    }
}
