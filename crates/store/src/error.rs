use thiserror::Error;

/// Crate-wide result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed persistence errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No entity with the requested identity exists.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness invariant would be violated.
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    /// The underlying database rejected the operation.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization of a stored column failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn conflict(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::Conflict {
            entity,
            key: key.to_string(),
        }
    }
}
