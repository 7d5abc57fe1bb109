use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide ingress counters shared by all samplers and workers.
///
/// Counters only ever increase. All updates use relaxed ordering, readers get an eventually
/// consistent view through [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct IngressCounters {
    datagrams: AtomicU64,
    lines: AtomicU64,
    dropped: AtomicU64,
}

impl IngressCounters {
    /// Creates a new set of counters, all starting at zero.
    pub const fn new() -> Self {
        Self {
            datagrams: AtomicU64::new(0),
            lines: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Records a received datagram.
    #[inline]
    pub fn datagram_received(&self) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a line observed in a datagram, whether it parses or not.
    #[inline]
    pub fn line_observed(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a discarded line or a failed receive.
    #[inline]
    pub fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current values of all counters.
    pub fn snapshot(&self) -> IngressSnapshot {
        IngressSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`IngressCounters`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IngressSnapshot {
    /// Datagrams received from all sockets.
    pub datagrams: u64,
    /// Lines observed, including lines that failed to parse.
    pub lines: u64,
    /// Lines that failed to parse plus receive calls that failed.
    pub dropped: u64,
}
