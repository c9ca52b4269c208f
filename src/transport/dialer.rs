use super::{Destination, Network, Stream, Transport};
use anyhow::Context as _;
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Keep-alive period applied to every TCP stream opened by [`Dialer`].
pub const DEFAULT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(10);

/// The default [`Transport`]: plain TCP and, on unix targets, Unix domain sockets.
///
/// TCP streams get keep-alive enabled as soon as they are connected.
#[derive(Debug, Clone)]
pub struct Dialer {
    keepalive_period: Option<Duration>,
}

impl Default for Dialer {
    fn default() -> Self {
        Self {
            keepalive_period: Some(DEFAULT_KEEPALIVE_PERIOD),
        }
    }
}

impl Dialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the keep-alive period of new TCP streams.
    /// `None` leaves the operating system defaults in place.
    #[must_use]
    pub fn keepalive_period(self, keepalive_period: Option<Duration>) -> Self {
        Self { keepalive_period }
    }

    async fn dial_tcp(&self, address: &str) -> Result<TcpStream, anyhow::Error> {
        let stream = TcpStream::connect(address).await?;
        if let Some(period) = self.keepalive_period {
            SockRef::from(&stream)
                .set_tcp_keepalive(&TcpKeepalive::new().with_time(period))
                .context("Failed to enable TCP keep-alive")?;
        }
        Ok(stream)
    }

    #[cfg(unix)]
    async fn dial_unix(&self, path: &str) -> Result<tokio::net::UnixStream, anyhow::Error> {
        Ok(tokio::net::UnixStream::connect(path).await?)
    }

    #[cfg(not(unix))]
    async fn dial_unix(&self, _path: &str) -> Result<TcpStream, anyhow::Error> {
        Err(anyhow::anyhow!(
            "Unix domain sockets are not available on this platform"
        ))
    }
}

#[async_trait::async_trait]
impl Transport for Dialer {
    #[tracing::instrument(
        name = "transport_dial",
        skip(self, destination),
        fields(destination = %destination)
    )]
    async fn dial(
        &self,
        destination: &Destination,
        dial_timeout: Duration,
    ) -> Result<Box<dyn Stream>, anyhow::Error> {
        let dial = async {
            let stream: Box<dyn Stream> = match destination.network {
                Network::Tcp => Box::new(self.dial_tcp(&destination.address).await?),
                Network::Unix => Box::new(self.dial_unix(&destination.address).await?),
            };
            Ok::<_, anyhow::Error>(stream)
        };
        match timeout(dial_timeout, dial).await {
            Ok(stream) => stream,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("dial {destination} timed out after {dial_timeout:?}"),
            )
            .into()),
        }
    }
}
