//! Error types for oppy operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::query::QueryError;

/// Result type alias using [`OppyError`].
pub type Result<T> = std::result::Result<T, OppyError>;

/// Failures while loading the config file or resolving a profile.
///
/// Every variant is fatal at startup: the shell is never entered with a
/// partially resolved configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Config file exists but could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid INI.
    #[error("malformed config file {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    /// No section matches the requested profile.
    #[error("profile '{profile}' not found in {}", path.display())]
    UnknownProfile { profile: String, path: PathBuf },

    /// A required key is absent from the profile and from `[DEFAULT]`.
    #[error("profile '{profile}': missing required key '{key}'")]
    MissingKey { profile: String, key: &'static str },

    /// A key is present but does not parse against its declared type.
    #[error("profile '{profile}': invalid value '{value}' for '{key}' (expected {expected})")]
    InvalidValue {
        profile: String,
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Errors that can occur while running the shell.
#[derive(Debug, Error)]
pub enum OppyError {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `op` rejected the session or the sign-in.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// `op` exited non-zero for a reason other than authentication.
    #[error("{program} exited with code {code}")]
    Subprocess {
        program: String,
        code: i32,
        stderr: String,
    },

    /// The `op` binary is not on PATH.
    #[error("1Password CLI not installed: {0}")]
    NotInstalled(String),

    /// The user interrupted a running command.
    #[error("interrupted")]
    Interrupted,

    /// An argument was rejected before reaching `op`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A search expression did not parse.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The on-disk item cache could not be sealed or opened.
    #[error("item cache error: {0}")]
    Cache(String),

    /// The OS secret store failed.
    #[error("secret store error: {0}")]
    Store(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Line editor failure.
    #[error("readline error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OppyError {
    /// Returns true when the error means the session token was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownProfile {
            profile: "work".to_string(),
            path: PathBuf::from("/tmp/config.ini"),
        };
        assert_eq!(err.to_string(), "profile 'work' not found in /tmp/config.ini");
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: OppyError = ConfigError::MissingKey {
            profile: "p1".to_string(),
            key: "domain",
        }
        .into();
        assert_eq!(err.to_string(), "profile 'p1': missing required key 'domain'");
    }

    #[test]
    fn test_unreadable_keeps_source() {
        let err = ConfigError::Unreadable {
            path: PathBuf::from("/root/config.ini"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn test_is_auth() {
        assert!(OppyError::Auth("expired".to_string()).is_auth());
        assert!(!OppyError::Interrupted.is_auth());
    }
}
