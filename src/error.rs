//! Error types for hearth
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in hearth
#[derive(Debug, Error)]
pub enum HearthError {
    /// Tool call named a tool that is not in the registry
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// A tool handler failed while executing
    #[error("Tool '{name}' failed: {cause}")]
    ToolFailed { name: String, cause: String },

    /// Tool call arguments did not match the tool's declared parameters
    #[error("Bad arguments for tool '{name}': {detail}")]
    BadToolArguments { name: String, detail: String },

    /// Transport failure or non-success status from the model endpoint
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    /// Endpoint answered with a body we could not interpret
    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    /// Vault persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for HearthError {
    fn from(err: rusqlite::Error) -> Self {
        HearthError::Storage(err.to_string())
    }
}

/// Result type alias for hearth operations
pub type Result<T> = std::result::Result<T, HearthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_error() {
        let err = HearthError::ToolNotFound("set_vibe".to_string());
        assert_eq!(err.to_string(), "Unknown tool: set_vibe");
    }

    #[test]
    fn test_tool_failed_error() {
        let err = HearthError::ToolFailed {
            name: "write_memory".to_string(),
            cause: "vault locked".to_string(),
        };
        assert_eq!(err.to_string(), "Tool 'write_memory' failed: vault locked");
    }

    #[test]
    fn test_bad_tool_arguments_error() {
        let err = HearthError::BadToolArguments {
            name: "set_vibe".to_string(),
            detail: "missing required parameter 'mood'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Bad arguments for tool 'set_vibe': missing required parameter 'mood'"
        );
    }

    #[test]
    fn test_unreachable_error() {
        let err = HearthError::Unreachable("status 503".to_string());
        assert_eq!(err.to_string(), "Gateway unreachable: status 503");
    }

    #[test]
    fn test_malformed_response_error() {
        let err = HearthError::MalformedResponse("missing choices".to_string());
        assert_eq!(err.to_string(), "Malformed gateway response: missing choices");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HearthError = io_err.into();
        assert!(matches!(err, HearthError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: HearthError = json_err.into();
        assert!(matches!(err, HearthError::Json(_)));
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let sqlite_err = rusqlite::Error::QueryReturnedNoRows;
        let err: HearthError = sqlite_err.into();
        assert!(matches!(err, HearthError::Storage(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(HearthError::ToolNotFound("nope".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
