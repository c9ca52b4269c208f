use crate::configuration::ConfigurationError;
use crate::context::ContextError;
use crate::transport::{Destination, UnsupportedNetwork};

/// Error returned when acquiring a [`Connection`](super::Connection).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The destination already has `max_count` open connections.
    ///
    /// Never retried internally: back off, or fail the outer request.
    #[error("Too many connections to {destination}")]
    TooManyConnections { destination: Destination },
    #[error("Failed to open a connection to {destination}")]
    Dial {
        destination: Destination,
        #[source]
        source: anyhow::Error,
    },
    /// The caller's [`Context`](crate::context::Context) was cancelled or expired.
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    UnsupportedNetwork(#[from] UnsupportedNetwork),
    #[error("Invalid pool settings")]
    InvalidConfiguration(#[from] ConfigurationError),
    /// The [`Manager`](crate::manager::Manager) has been shut down.
    #[error("The connection pool has been shut down")]
    Closed,
}
