use std::fmt;

/// Result type for Hermes operations
pub type Result<T> = std::result::Result<T, HermesError>;

/// Main error type for the Hermes training orchestrator
#[derive(Debug, Clone)]
pub enum HermesError {
    /// Missing or invalid hyperparameter / collaborator at construction
    ConfigError {
        name: String,
        reason: String,
    },

    /// Error propagated unmodified from an external environment
    EnvError(String),

    /// Batch columns or parameter vectors disagree on dimensions
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Empty buffer or container
    EmptyBuffer(String),

    /// Failure during the training loop itself
    TrainingError(String),

    /// IO errors (model files, result export)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),
}

impl fmt::Display for HermesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HermesError::ConfigError { name, reason } => {
                write!(f, "Configuration error '{}': {}", name, reason)
            }
            HermesError::EnvError(msg) => write!(f, "Environment error: {}", msg),
            HermesError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            HermesError::EmptyBuffer(msg) => write!(f, "Empty buffer: {}", msg),
            HermesError::TrainingError(msg) => write!(f, "Training error: {}", msg),
            HermesError::IoError(msg) => write!(f, "IO error: {}", msg),
            HermesError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for HermesError {}

// Conversion from std::io::Error
impl From<std::io::Error> for HermesError {
    fn from(err: std::io::Error) -> Self {
        HermesError::IoError(err.to_string())
    }
}

// Conversion from bincode::Error
impl From<bincode::Error> for HermesError {
    fn from(err: bincode::Error) -> Self {
        HermesError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl HermesError {
    pub fn config_error<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        HermesError::ConfigError {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        HermesError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
