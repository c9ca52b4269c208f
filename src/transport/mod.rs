//! The boundary between the pool and the byte streams it hands out.
//!
//! The pool never reads or writes on its own account, except for the one-byte leak probe of the
//! maintenance loop. All it needs from a transport is a way to open a [`Stream`] to a
//! [`Destination`]; closing a stream is dropping it.

mod dialer;

pub use dialer::{Dialer, DEFAULT_KEEPALIVE_PERIOD};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// The network protocol half of a [`Destination`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Unix,
}

impl FromStr for Network {
    type Err = UnsupportedNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" | "tcp4" | "tcp6" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            other => Err(UnsupportedNetwork(other.to_owned())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Unix => write!(f, "unix"),
        }
    }
}

/// Returned when parsing a network name the crate cannot dial.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported network `{0}`")]
pub struct UnsupportedNetwork(pub String);

/// A remote endpoint with its own pool: a network protocol plus an address.
///
/// For [`Network::Tcp`] the address is `host:port`, for [`Network::Unix`] it is a socket path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub network: Network,
    pub address: String,
}

impl Destination {
    pub fn new(network: Network, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(Network::Tcp, address)
    }

    pub fn unix(path: impl Into<String>) -> Self {
        Self::new(Network::Unix, path)
    }

    /// Build a destination from the textual network name used by most dial APIs.
    pub fn parse(network: &str, address: impl Into<String>) -> Result<Self, UnsupportedNetwork> {
        Ok(Self::new(network.parse()?, address))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.address)
    }
}

/// A connected, bidirectional byte stream.
///
/// Blanket-implemented for everything that looks like one, so tokio's TCP and Unix streams
/// (and in-memory duplex streams in tests) qualify as they are.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static {}

/// `Transport` defines an interface for types that are capable of opening new streams
/// to a [`Destination`].
///
/// # Note
///
/// Implementations are expected to give up once `timeout` has elapsed. The pool enforces
/// its own deadlines on top, so an implementation that ignores `timeout` is still bounded.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new stream to `destination`.
    async fn dial(
        &self,
        destination: &Destination,
        timeout: Duration,
    ) -> Result<Box<dyn Stream>, anyhow::Error>;
}
