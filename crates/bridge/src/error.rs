use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No live adapter with the given instance ID.
    #[error("unknown service instance: {id}")]
    UnknownInstance { id: i64 },

    /// Re-initialize requested for an instance that is not in a terminal
    /// state.
    #[error("service instance {id} is {status}, not restartable")]
    NotRestartable { id: i64, status: String },

    /// One or more adapters failed to terminate cleanly within the drain
    /// timeout.
    #[error("{failed} service(s) failed to shut down cleanly")]
    ShutdownIncomplete { failed: usize },

    #[error(transparent)]
    Store(#[from] chatplug_store::Error),

    #[error(transparent)]
    Service(#[from] chatplug_services::Error),
}
