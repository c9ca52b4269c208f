//! Decides whether a released record goes back to the free queue or gets closed.
use std::io;

/// The condition last observed on a record's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Bytes were waiting on the stream when nobody was using it: the previous holder did not
    /// drain a response. The next holder would read somebody else's data.
    Leaked,
    /// The record sat in the free queue for longer than the idle timeout.
    Idle,
    /// A read, write or probe failed.
    Io(io::ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Reuse,
    Destroy,
}

/// `live` is the number of open records for the destination, `init_count` the warm floor.
pub(crate) fn disposition(fault: Option<&Fault>, live: usize, init_count: usize) -> Disposition {
    match fault {
        None => Disposition::Reuse,
        Some(Fault::Leaked) => Disposition::Destroy,
        Some(Fault::Idle) if live > init_count => Disposition::Destroy,
        Some(Fault::Idle) => Disposition::Reuse,
        // A deadline expiring says nothing about the health of the stream.
        Some(Fault::Io(kind)) if is_timeout(*kind) => Disposition::Reuse,
        Some(Fault::Io(_)) => Disposition::Destroy,
    }
}

fn is_timeout(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
