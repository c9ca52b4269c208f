//! Per-destination pooling of stream connections.
//!
//! This module provides three key guarantees:
//! - No more than `max_count` streams are ever open to the same destination.
//! - Streams that saw a fatal error, or that still hold bytes nobody read, are closed instead
//!   of being handed to the next caller.
//! - A background task keeps at least `min_count` streams open, so callers rarely pay for a dial.
//!
//! Pools are created and owned by a [`Manager`](crate::manager::Manager); the only type callers
//! hold is the [`Connection`] handle.
//!
//! ```rust,no_run
//! use stream_pool::configuration::PoolSettings;
//! use stream_pool::context::Context;
//! use stream_pool::manager::Manager;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! // Function for asyncness.
//! async fn example() -> Result<(), stream_pool::pool::Error> {
//!     let settings = PoolSettings {
//!         init_count: 1,
//!         min_count: 2,
//!         max_count: 16,
//!         ..Default::default()
//!     };
//!     let manager = Manager::builder(settings).build()?;
//!
//!     let mut connection = manager
//!         .acquire(&Context::background(), "tcp", "127.0.0.1:6379")
//!         .await?;
//!     let _ = connection.write_all(b"PING\r\n").await;
//!     let mut reply = [0u8; 7];
//!     let _ = connection.read_exact(&mut reply).await;
//!
//!     // Back to the pool.
//!     drop(connection);
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

mod connection;
mod destination;
mod error;
mod recycle;

pub use connection::Connection;
pub(crate) use destination::Pool;
pub use destination::DEFAULT_DIAL_TIMEOUT;
pub use error::Error;

/// A snapshot of the pool for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// `max_count` for the destination.
    pub max_size: usize,
    /// Open streams, checked out or not.
    pub size: usize,
    /// Streams waiting in the free queue.
    pub available: usize,
}
