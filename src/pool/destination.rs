//! The pool for a single destination: the free queue, capacity accounting, warm-up and the
//! maintenance loop.
use super::connection::{Connection, Record};
use super::recycle::{self, Disposition, Fault};
use super::{Error, PoolStatus};
use crate::configuration::PoolSettings;
use crate::context::Context;
use crate::transport::{Destination, Stream, Transport};
use crossbeam_queue::ArrayQueue;
use futures_util::{stream::FuturesUnordered, StreamExt};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dial timeout for warm-up and replenishing, and for acquisitions without a deadline.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(1);
/// How many times an acquisition polls the free queue before dialing.
pub(crate) const FAST_PATH_ATTEMPTS: usize = 10;
/// How long the maintenance sweep waits for unread bytes on a free stream.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_millis(1);

/// The ceiling a dial is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Limit {
    Init,
    Min,
    Max,
}

#[derive(Debug)]
enum DialError {
    LimitReached,
    Transport(anyhow::Error),
}

/// Pools the streams to one [`Destination`].
///
/// `live` counts every open record: checked out, free, or drained by the sweep. It only grows
/// while `dial_lock` is held, which is also where it is checked against the ceilings, so
/// concurrent dials can never overshoot `max_count`.
pub(crate) struct Pool {
    destination: Destination,
    settings: PoolSettings,
    transport: Arc<dyn Transport>,
    free: ArrayQueue<Record>,
    live: AtomicUsize,
    dial_lock: Mutex<()>,
    shutdown: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("destination", &self.destination)
            .field("status", &self.status())
            .finish()
    }
}

impl Pool {
    pub(crate) fn new(
        destination: Destination,
        settings: PoolSettings,
        transport: Arc<dyn Transport>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        // `ArrayQueue` rejects a zero capacity.
        let capacity = settings.max_count.max(1);
        Arc::new(Self {
            destination,
            settings,
            transport,
            free: ArrayQueue::new(capacity),
            live: AtomicUsize::new(0),
            dial_lock: Mutex::new(()),
            shutdown,
            tasks: std::sync::Mutex::new(Vec::with_capacity(2)),
        })
    }

    pub(crate) fn destination(&self) -> &Destination {
        &self.destination
    }

    pub(crate) fn status(&self) -> PoolStatus {
        PoolStatus {
            max_size: self.settings.max_count,
            size: self.live.load(Ordering::Acquire),
            available: self.free.len(),
        }
    }

    /// Spawn the maintenance loop and the warm-up dials.
    ///
    /// The returned gate resolves once the first warm-up dial succeeds, or once every warm-up
    /// dial has given up.
    pub(crate) fn start(self: &Arc<Self>) -> oneshot::Receiver<()> {
        let (ready, gate) = oneshot::channel();
        let maintenance = tokio::spawn(Arc::clone(self).maintain());
        let warm_up = tokio::spawn(Arc::clone(self).warm_up(ready));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([maintenance, warm_up]);
        gate
    }

    async fn warm_up(self: Arc<Self>, ready: oneshot::Sender<()>) {
        if self.settings.init_count == 0 {
            let _ = ready.send(());
            return;
        }

        let mut ready = Some(ready);
        let mut dials: FuturesUnordered<_> = (0..self.settings.init_count)
            .map(|_| self.create(DEFAULT_DIAL_TIMEOUT, Limit::Init))
            .collect();
        loop {
            let outcome = tokio::select! {
                outcome = dials.next() => outcome,
                _ = self.shutdown.cancelled() => return,
            };
            match outcome {
                None => return,
                Some(Ok(record)) => {
                    self.put(record);
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(());
                    }
                }
                Some(Err(DialError::LimitReached)) => {}
                Some(Err(DialError::Transport(e))) => {
                    warn!(destination = %self.destination, "Warm-up dial failed: {:?}", e);
                }
            }
        }
    }

    /// Runs until the pool is shut down: sweep the free queue, top the pool up to `min_count`,
    /// then sleep for `check_interval`.
    async fn maintain(self: Arc<Self>) {
        let check_interval = self.settings.check_interval();
        loop {
            self.sweep().await;
            tokio::select! {
                _ = self.replenish() => {}
                _ = self.shutdown.cancelled() => return,
            }
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {}
                _ = self.shutdown.cancelled() => return,
            }
        }
    }

    /// Health-check every record currently sitting in the free queue.
    ///
    /// Records are drained first and probed afterwards so that none is checked twice in the
    /// same sweep. Records checked out to callers are not touched.
    async fn sweep(&self) {
        let drained: Vec<Record> = std::iter::from_fn(|| self.free.pop())
            .take(self.settings.max_count)
            .collect();
        let idle_timeout = self.settings.idle_timeout();
        for mut record in drained {
            record.last_error = if record.released_at.elapsed() >= idle_timeout {
                Some(Fault::Idle)
            } else {
                probe(&mut record.stream).await
            };
            self.put(record);
        }
    }

    async fn replenish(&self) {
        let deficit = self
            .settings
            .min_count
            .saturating_sub(self.live.load(Ordering::Acquire));
        for _ in 0..deficit {
            match self.create(DEFAULT_DIAL_TIMEOUT, Limit::Min).await {
                Ok(record) => self.put(record),
                Err(DialError::LimitReached) => break,
                Err(DialError::Transport(e)) => {
                    warn!(destination = %self.destination, "Replenishing dial failed: {:?}", e);
                    break;
                }
            }
        }
    }

    /// Check out a stream: reuse a free one if there is any, dial a new one otherwise.
    ///
    /// Never waits for another caller to release a stream: if the destination is already at
    /// `max_count`, it fails straight away with [`Error::TooManyConnections`].
    pub(crate) async fn get(self: &Arc<Self>, ctx: &Context) -> Result<Connection, Error> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }

        let mut record = match self.fast_get(ctx).await? {
            Some(record) => record,
            None => {
                let dial_timeout = ctx.remaining().unwrap_or(DEFAULT_DIAL_TIMEOUT);
                tokio::select! {
                    created = self.create(dial_timeout, Limit::Max) => {
                        created.map_err(|e| self.dial_error(ctx, e))?
                    }
                    e = ctx.done() => return Err(e.into()),
                }
            }
        };
        record.used_at = tokio::time::Instant::now();
        Ok(Connection::new(record, Arc::clone(self)))
    }

    async fn fast_get(&self, ctx: &Context) -> Result<Option<Record>, Error> {
        for _ in 0..FAST_PATH_ATTEMPTS {
            if let Some(e) = ctx.err() {
                return Err(e.into());
            }
            if let Some(record) = self.free.pop() {
                return Ok(Some(record));
            }
            tokio::task::yield_now().await;
        }
        Ok(None)
    }

    fn dial_error(&self, ctx: &Context, error: DialError) -> Error {
        match error {
            DialError::LimitReached => Error::TooManyConnections {
                destination: self.destination.clone(),
            },
            // The dial timeout is the context's deadline: report it as such.
            DialError::Transport(source) => match ctx.err() {
                Some(e) => Error::Context(e),
                None => Error::Dial {
                    destination: self.destination.clone(),
                    source,
                },
            },
        }
    }

    /// Dial a new record, unless `live` has already reached the ceiling selected by `limit`.
    #[tracing::instrument(
        name = "pool_dial",
        skip(self, dial_timeout),
        fields(destination = %self.destination)
    )]
    async fn create(&self, dial_timeout: Duration, limit: Limit) -> Result<Record, DialError> {
        let _guard = self.dial_lock.lock().await;
        let ceiling = match limit {
            Limit::Init => self.settings.init_count,
            Limit::Min => self.settings.min_count,
            Limit::Max => self.settings.max_count,
        };
        if self.live.load(Ordering::Acquire) >= ceiling {
            return Err(DialError::LimitReached);
        }

        let dial = self.transport.dial(&self.destination, dial_timeout);
        let stream = match timeout(dial_timeout, dial).await {
            Ok(stream) => stream.map_err(DialError::Transport)?,
            Err(_) => {
                return Err(DialError::Transport(
                    io::Error::new(io::ErrorKind::TimedOut, "dial timed out").into(),
                ))
            }
        };
        self.live.fetch_add(1, Ordering::AcqRel);
        let record = Record::new(stream);
        debug!(id = %record.id, "Opened connection");
        Ok(record)
    }

    /// Take a record back, from a caller or from the maintenance sweep.
    ///
    /// The record's last error decides between the free queue and closing the stream.
    /// Closing also frees a slot under `max_count`.
    pub(crate) fn put(&self, mut record: Record) {
        if self.shutdown.is_cancelled() {
            self.discard(record, "shutdown");
            return;
        }

        let fault = record.last_error.take();
        let init_count = self.settings.init_count;
        // Deciding and decrementing in one step keeps concurrent idle releases from taking
        // the pool below `init_count`.
        let destroyed = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                match recycle::disposition(fault.as_ref(), live, init_count) {
                    Disposition::Destroy => Some(live.saturating_sub(1)),
                    Disposition::Reuse => None,
                }
            })
            .is_ok();
        if destroyed {
            debug!(id = %record.id, ?fault, "Closed connection");
            return;
        }

        if let Err(record) = self.free.push(record) {
            self.discard(record, "free queue full");
        }
    }

    fn discard(&self, record: Record, reason: &str) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(id = %record.id, reason, "Closed connection");
    }

    /// Stop the background tasks, wait for them, and close every free stream.
    ///
    /// Streams checked out at this point are closed when their handles are released.
    pub(crate) async fn close(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await {
                warn!(destination = %self.destination, "Pool task failed: {}", e);
            }
        }
        while let Some(record) = self.free.pop() {
            self.discard(record, "shutdown");
        }
    }
}

/// Look for bytes nobody asked for on a stream that is not checked out.
///
/// `None` means nothing arrived before [`PROBE_TIMEOUT`]: the stream is quiet, as it should be.
async fn probe(stream: &mut Box<dyn Stream>) -> Option<Fault> {
    let mut byte = [0u8; 1];
    match timeout(PROBE_TIMEOUT, stream.read(&mut byte)).await {
        Err(_) => None,
        Ok(Ok(0)) => Some(Fault::Io(io::ErrorKind::UnexpectedEof)),
        Ok(Ok(_)) => Some(Fault::Leaked),
        Ok(Err(e)) => Some(Fault::Io(e.kind())),
    }
}
