//! Typed error hierarchy for the clobberer service.
//!
//! Three top-level enums cover the three failure domains:
//! - `TaskclusterError`: remote index/queue calls
//! - `ClobbererError`: clobber queries, writes and summaries
//! - `ConfigError`: loading `clobberer.toml` and environment overrides

use thiserror::Error;

/// Errors from the Taskcluster REST client.
#[derive(Debug, Error)]
pub enum TaskclusterError {
    /// The index or queue answered 404. The summarizer treats this as
    /// "no data for this branch".
    #[error("Taskcluster resource not found: {url}")]
    NotFound { url: String },

    #[error("Taskcluster returned {status} for {url}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Taskcluster request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed Taskcluster response from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl TaskclusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskclusterError::NotFound { .. })
    }
}

/// Errors from the clobberer subsystem.
#[derive(Debug, Error)]
pub enum ClobbererError {
    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Taskcluster(#[from] TaskclusterError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

/// Errors while assembling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taskcluster_not_found_is_detected() {
        let err = TaskclusterError::NotFound {
            url: "https://tc/api/index/v1/task/x".into(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/task/x"));
    }

    #[test]
    fn taskcluster_status_is_not_not_found() {
        let err = TaskclusterError::Status {
            url: "u".into(),
            status: 500,
            message: "boom".into(),
        };
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn clobberer_error_converts_from_taskcluster_error() {
        let inner = TaskclusterError::Malformed {
            url: "u".into(),
            message: "missing taskId".into(),
        };
        let err: ClobbererError = inner.into();
        match &err {
            ClobbererError::Taskcluster(TaskclusterError::Malformed { message, .. }) => {
                assert_eq!(message, "missing taskId");
            }
            _ => panic!("Expected ClobbererError::Taskcluster(Malformed)"),
        }
    }

    #[test]
    fn config_error_invalid_env_carries_var() {
        let err = ConfigError::InvalidEnv {
            var: "CLOBBERER_PORT",
            value: "abc".into(),
        };
        assert!(err.to_string().contains("CLOBBERER_PORT"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&TaskclusterError::NotFound { url: "x".into() });
        assert_std_error(&ClobbererError::LockPoisoned);
        assert_std_error(&ConfigError::InvalidEnv {
            var: "X",
            value: "y".into(),
        });
    }
}
