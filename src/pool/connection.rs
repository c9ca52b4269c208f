//! The record the pool keeps for every open stream, and the handle callers hold while using one.
use super::destination::Pool;
use super::recycle::Fault;
use crate::transport::{Destination, Stream};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;
use uuid::Uuid;

/// An open stream plus the bookkeeping the pool needs to decide whether it can be reused.
///
/// A record lives in exactly one place at a time: the pool's free queue, a [`Connection`]
/// handle, or the maintenance sweep that drained it.
#[derive(Debug)]
pub(crate) struct Record {
    pub(crate) id: Uuid,
    pub(crate) stream: Box<dyn Stream>,
    pub(crate) used_at: Instant,
    pub(crate) released_at: Instant,
    pub(crate) last_error: Option<Fault>,
}

impl Record {
    pub(crate) fn new(stream: Box<dyn Stream>) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            stream,
            used_at: now,
            released_at: now,
            last_error: None,
        }
    }
}

/// A pooled stream, checked out to the caller.
///
/// `Connection` reads and writes like the stream it wraps ([`AsyncRead`] + [`AsyncWrite`]),
/// remembering the last error it saw along the way.
///
/// Dropping the handle releases it: the stream goes back to the pool it came from, which reuses
/// it or closes it depending on that last error. Release a connection only once its responses
/// have been fully read; a stream with unread bytes is detected and closed by the pool's
/// maintenance sweep rather than handed to the next caller.
#[derive(Debug)]
pub struct Connection {
    record: Option<Record>,
    pool: Arc<Pool>,
}

impl Connection {
    pub(crate) fn new(record: Record, pool: Arc<Pool>) -> Self {
        Self {
            record: Some(record),
            pool,
        }
    }

    fn record(&self) -> &Record {
        self.record
            .as_ref()
            .expect("the record is only taken on drop. This is a bug with stream-pool")
    }

    fn record_mut(&mut self) -> &mut Record {
        self.record
            .as_mut()
            .expect("the record is only taken on drop. This is a bug with stream-pool")
    }

    /// Identifies the underlying stream across checkouts.
    ///
    /// Two handles with the same id wrapped the same stream.
    pub fn id(&self) -> Uuid {
        self.record().id
    }

    pub fn destination(&self) -> &Destination {
        self.pool.destination()
    }

    /// When the stream was last handed out.
    pub fn used_at(&self) -> Instant {
        self.record().used_at
    }

    /// When the stream was last released.
    pub fn released_at(&self) -> Instant {
        self.record().released_at
    }

    /// Record a failure observed outside of the stream itself.
    ///
    /// Reads and writes through the handle are tracked automatically, but deadlines enforced
    /// by the caller (e.g. with [`tokio::time::timeout`]) never reach the stream. Recording them
    /// lets the pool tell an expired deadline, which keeps the stream reusable, apart from a
    /// broken stream, which gets closed on release.
    pub fn record_error(&mut self, error: &io::Error) {
        self.record_mut().last_error = Some(Fault::Io(error.kind()));
    }

    /// Hand the stream back to its pool.
    ///
    /// Same as dropping the handle.
    pub fn release(self) {
        drop(self)
    }

    fn observe<T>(&mut self, poll: &Poll<io::Result<T>>) {
        if let Poll::Ready(Err(e)) = poll {
            self.record_mut().last_error = Some(Fault::Io(e.kind()));
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.released_at = Instant::now();
            self.pool.put(record);
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let wanted = buf.remaining();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.record_mut().stream).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if wanted > 0 && buf.filled().len() == before {
                // End of stream: the peer is gone.
                this.record_mut().last_error = Some(Fault::Io(io::ErrorKind::UnexpectedEof));
            }
        }
        this.observe(&poll);
        poll
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.record_mut().stream).poll_write(cx, buf);
        this.observe(&poll);
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.record_mut().stream).poll_write_vectored(cx, bufs);
        this.observe(&poll);
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.record().stream.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.record_mut().stream).poll_flush(cx);
        this.observe(&poll);
        poll
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.record_mut().stream).poll_shutdown(cx);
        match &poll {
            // The write half is closed: nobody else can use this stream.
            Poll::Ready(Ok(())) => {
                this.record_mut().last_error = Some(Fault::Io(io::ErrorKind::BrokenPipe))
            }
            _ => this.observe(&poll),
        }
        poll
    }
}
