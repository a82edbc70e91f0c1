//! Error types for depimg
//!
//! All modules use `DepimgResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for depimg operations
pub type DepimgResult<T> = Result<T, DepimgError>;

/// All errors that can occur in depimg
#[derive(Error, Debug)]
pub enum DepimgError {
    // Configuration errors
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Runtime errors
    #[error("Container runtime '{runtime}' is not accessible, even with sudo")]
    RuntimeUnavailable { runtime: String },

    // Builder errors
    #[error("Layer build failed in container {container}: {command}: {reason}")]
    Builder {
        container: String,
        command: String,
        reason: String,
    },

    #[error("Failed to tag {image_source} as {target}: {reason}")]
    Tag {
        image_source: String,
        target: String,
        reason: String,
    },

    #[error("Failed to remove image {image}: {reason}")]
    ImageRemove { image: String, reason: String },

    // Process errors
    #[error("Command failed to start: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    #[error("Interrupted while running: {command}")]
    Interrupted { command: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DepimgError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeUnavailable { .. } => Some(
                "Add your user to the runtime group (e.g. 'docker'), or allow non-interactive sudo",
            ),
            Self::Builder { .. } => {
                Some("The failed container was preserved; see the reproduction steps above")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DepimgError::RuntimeUnavailable {
            runtime: "docker".to_string(),
        };
        assert!(err.to_string().contains("docker"));
    }

    #[test]
    fn error_hint() {
        let err = DepimgError::RuntimeUnavailable {
            runtime: "docker".to_string(),
        };
        assert!(err.hint().is_some());
        assert!(DepimgError::Interrupted {
            command: "x".to_string()
        }
        .hint()
        .is_none());
    }

    #[test]
    fn builder_error_names_container_and_command() {
        let err = DepimgError::Builder {
            container: "depimg_curl_ab12cd34".to_string(),
            command: "apt-get install -y curl".to_string(),
            reason: "exit status 100".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("depimg_curl_ab12cd34"));
        assert!(msg.contains("apt-get install -y curl"));
    }
}
