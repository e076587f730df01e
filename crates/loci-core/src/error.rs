use thiserror::Error;

/// Top-level error type for the Loci system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for LociError`
/// (or carry a `Storage(#[from] LociError)` variant) so that the `?`
/// operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LociError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

impl From<toml::de::Error> for LociError {
    fn from(err: toml::de::Error) -> Self {
        LociError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LociError {
    fn from(err: toml::ser::Error) -> Self {
        LociError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LociError {
    fn from(err: serde_json::Error) -> Self {
        LociError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Loci operations.
pub type Result<T> = std::result::Result<T, LociError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LociError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = LociError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");

        let err = LociError::NotFound("action 7".to_string());
        assert_eq!(err.to_string(), "Not found: action 7");

        let err = LociError::RateLimited;
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LociError = io_err.into();
        assert!(matches!(err, LociError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_conversion() {
        let bad_json = "{ invalid json }";
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        let err: LociError = parse.unwrap_err().into();
        assert!(matches!(err, LociError::Serialization(_)));
    }

    #[test]
    fn test_toml_conversion() {
        let bad_toml = "invalid = [[[";
        let parse: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        let err: LociError = parse.unwrap_err().into();
        assert!(matches!(err, LociError::Config(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }
}
