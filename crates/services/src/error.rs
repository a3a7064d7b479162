use std::error::Error as StdError;

/// Crate-wide result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed adapter errors shared across the capability contract.
///
/// Authentication and connection failures are confined to the failing
/// instance; delivery failures are confined to one (message, target) pair.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The platform rejected the instance credentials.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The external session could not be established or was lost.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// A single `send` to one target thread failed.
    #[error("delivery to thread {target} failed: {message}")]
    Delivery { target: String, message: String },

    /// Operation is currently unavailable (not initialized/already stopped).
    #[error("service unavailable: {message}")]
    Unavailable { message: String },

    /// Wrapped source error from an external dependency.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn authentication(message: impl std::fmt::Display) -> Self {
        Self::Authentication {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn connection(message: impl std::fmt::Display) -> Self {
        Self::Connection {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn delivery(target: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Delivery {
            target: target.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
