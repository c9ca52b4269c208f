//! `stream-pool` hands out reusable stream connections, pooled per destination.
//!
//! Every destination (a network plus an address) gets its own bounded pool. Streams are
//! recycled based on the last error they saw, streams with unread bytes are caught before
//! they reach the next caller, and a background task keeps a warm minimum of streams open.
//!
//! [`Manager`](crate::manager::Manager) is the best starting point to learn more about what
//! `stream-pool` provides and how to leverage it.
//!
//! ## Examples
//!
//! Check the `demos` directory to see the library in action.

pub mod configuration;
pub mod context;
pub mod manager;
pub mod pool;
pub mod transport;
