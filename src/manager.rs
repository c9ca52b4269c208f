//! The registry of per-destination pools.
use crate::configuration::PoolSettings;
use crate::context::Context;
use crate::pool::{Connection, Error, Pool, PoolStatus};
use crate::transport::{Destination, Dialer, Transport};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Hands out pooled streams to any number of destinations.
///
/// `Manager` is the entrypoint of the crate. Build one per application (or per client), share
/// it behind an `Arc`, and call [`Manager::acquire`] whenever you need a stream.
///
/// # Lazy pools
///
/// The pool for a destination is created the first time it is asked for, with a copy of the
/// manager's [`PoolSettings`]. Creating it dials `init_count` streams in the background and
/// starts the maintenance task of that destination; the caller that triggered the creation
/// waits until the first of those streams is ready.
///
/// Pools are never evicted: they live until [`Manager::shutdown`] is called or the manager
/// is dropped.
///
/// # Shutdown
///
/// [`Manager::shutdown`] stops every maintenance task, waits for them, and closes every idle
/// stream. Dropping the manager stops the tasks without waiting for them.
pub struct Manager {
    settings: PoolSettings,
    transport: Arc<dyn Transport>,
    pools: DashMap<Destination, Arc<Pool>>,
    shutdown: CancellationToken,
}

impl Manager {
    /// Create a manager that dials with the default [`Dialer`].
    ///
    /// `settings` are trusted as they are: see [`PoolSettings::validate`], or use
    /// [`Manager::builder`] to have them checked.
    pub fn new(settings: PoolSettings) -> Self {
        Self::with_transport(settings, Dialer::default())
    }

    /// Create a manager that opens its streams through `transport`.
    pub fn with_transport(settings: PoolSettings, transport: impl Transport) -> Self {
        Self::from_parts(settings, Arc::new(transport))
    }

    /// Start building a [`Manager`].
    pub fn builder(settings: PoolSettings) -> ManagerBuilder {
        ManagerBuilder {
            settings,
            transport: None,
        }
    }

    fn from_parts(settings: PoolSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            pools: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Acquire a stream to `address` over `network` (`"tcp"`, `"tcp4"`, `"tcp6"` or `"unix"`).
    ///
    /// See [`Manager::acquire_destination`].
    pub async fn acquire(
        &self,
        ctx: &Context,
        network: &str,
        address: &str,
    ) -> Result<Connection, Error> {
        let destination = Destination::parse(network, address)?;
        self.acquire_destination(ctx, &destination).await
    }

    /// Acquire a stream to `destination`.
    ///
    /// A free stream is reused when there is one; otherwise a new one is dialed, bounded by
    /// the deadline of `ctx` (or [`DEFAULT_DIAL_TIMEOUT`](crate::pool::DEFAULT_DIAL_TIMEOUT)).
    ///
    /// Fails with:
    /// - [`Error::TooManyConnections`] if the destination already has `max_count` streams open.
    ///   Acquisition never queues behind other callers.
    /// - [`Error::Context`] if `ctx` is cancelled or expires first.
    /// - [`Error::Dial`] if the transport fails to open a stream.
    /// - [`Error::Closed`] after [`Manager::shutdown`].
    #[tracing::instrument(
        name = "pool_acquire",
        skip(self, ctx, destination),
        fields(destination = %destination)
    )]
    pub async fn acquire_destination(
        &self,
        ctx: &Context,
        destination: &Destination,
    ) -> Result<Connection, Error> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }

        let (pool, gate) = self.pool_for(destination);
        if let Some(gate) = gate {
            tokio::select! {
                // Dropped without a signal when every warm-up dial failed: fall through
                // and let the acquisition report the dial error itself.
                _ = gate => {}
                e = ctx.done() => return Err(e.into()),
            }
        }
        pool.get(ctx).await
    }

    /// Look up the pool for `destination`, creating and starting it if needed.
    ///
    /// The readiness gate is only returned to the caller that created the pool.
    fn pool_for(&self, destination: &Destination) -> (Arc<Pool>, Option<oneshot::Receiver<()>>) {
        if let Some(pool) = self.pools.get(destination) {
            return (Arc::clone(pool.value()), None);
        }
        match self.pools.entry(destination.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), None),
            Entry::Vacant(entry) => {
                let pool = Pool::new(
                    destination.clone(),
                    self.settings.clone(),
                    Arc::clone(&self.transport),
                    self.shutdown.child_token(),
                );
                let gate = pool.start();
                entry.insert(Arc::clone(&pool));
                tracing::debug!(destination = %destination, "Created pool");
                (pool, Some(gate))
            }
        }
    }

    /// A snapshot of the pool for `destination`, `None` if it has not been created yet.
    pub fn status(&self, destination: &Destination) -> Option<PoolStatus> {
        self.pools.get(destination).map(|pool| pool.status())
    }

    /// Every destination with a pool.
    pub fn destinations(&self) -> Vec<Destination> {
        self.pools.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Stop every maintenance task, wait for them to finish, and close every idle stream.
    ///
    /// Acquisitions fail with [`Error::Closed`] from now on. Streams still checked out are
    /// closed when they are released.
    #[tracing::instrument(skip_all, name = "pool_manager_shutdown")]
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let pools: Vec<Arc<Pool>> = self
            .pools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.pools.clear();
        futures_util::future::join_all(pools.iter().map(|pool| pool.close())).await;
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Primitives for building a [`Manager`].
pub struct ManagerBuilder {
    settings: PoolSettings,
    transport: Option<Arc<dyn Transport>>,
}

impl ManagerBuilder {
    /// Open streams through `transport` instead of the default [`Dialer`].
    #[must_use]
    pub fn transport(self, transport: impl Transport) -> Self {
        Self {
            transport: Some(Arc::new(transport)),
            ..self
        }
    }

    /// Check the settings and create the [`Manager`].
    pub fn build(self) -> Result<Manager, Error> {
        self.settings.validate()?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(Dialer::default()),
        };
        Ok(Manager::from_parts(self.settings, transport))
    }
}
