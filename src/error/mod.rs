//! Error handling for the harmonization core.

use arrow::error::ArrowError;

/// Specialized error type for crosswalk resolution, comparison, aggregation
/// and trend detection
#[derive(Debug, thiserror::Error)]
pub enum HarmonizeError {
    /// A crosswalk table is ambiguous, malformed, or a mandatory mapping is missing
    #[error("Crosswalk integrity error: {0}")]
    CrosswalkIntegrity(String),

    /// The match keys do not uniquely identify a flow within a source
    #[error("Comparison key error: {0}")]
    ComparisonKey(String),

    /// An invalid combination of options was supplied
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tabular input rejected at the boundary
    #[error("Schema error: {0}")]
    Schema(String),

    /// Repeated native rows under the `Reject` duplicate policy
    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error converting between records and Arrow batches
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_arrow::Error),

    /// The trend worker pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl HarmonizeError {
    /// Create a crosswalk integrity error
    pub fn crosswalk(msg: impl Into<String>) -> Self {
        Self::CrosswalkIntegrity(msg.into())
    }

    /// Create a comparison key error
    pub fn comparison_key(msg: impl Into<String>) -> Self {
        Self::ComparisonKey(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Whether the error signals inconsistent input data rather than a
    /// misconfigured call
    #[must_use]
    pub const fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::CrosswalkIntegrity(_) | Self::ComparisonKey(_) | Self::DuplicateRecord(_)
        )
    }
}

/// Result type for harmonization operations
pub type Result<T> = std::result::Result<T, HarmonizeError>;
