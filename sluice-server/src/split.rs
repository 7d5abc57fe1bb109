use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sluice_metrics::{MetricRegistry, ParseMetricError, parse_line};

use crate::stats::IngressCounters;

/// A received datagram, borrowed from the receive buffer it was written to.
///
/// The datagram is moved into [`split_datagram`], which parses it in place. The buffer can only
/// be reused once splitting has finished.
#[derive(Debug)]
pub struct RawDatagram<'a> {
    /// The received bytes.
    pub payload: &'a mut [u8],
    /// The sender, if the platform reported one.
    pub from: Option<SocketAddr>,
    /// Whether the kernel cut the datagram off at the maximum packet size.
    pub truncated: bool,
}

impl<'a> RawDatagram<'a> {
    /// Creates a complete datagram without sender information.
    pub fn new(payload: &'a mut [u8]) -> Self {
        Self {
            payload,
            from: None,
            truncated: false,
        }
    }
}

/// State shared by all workers of a sampler.
#[derive(Debug)]
pub struct SamplerContext<R> {
    kind: &'static str,
    registry: Arc<R>,
    stats: Arc<IngressCounters>,
    inflow: AtomicU64,
}

impl<R> SamplerContext<R> {
    /// Creates the context for a sampler of the given kind.
    pub fn new(kind: &'static str, registry: Arc<R>, stats: Arc<IngressCounters>) -> Self {
        Self {
            kind,
            registry,
            stats,
            inflow: AtomicU64::new(0),
        }
    }

    /// The sampler kind, reported in diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The process-wide ingress counters.
    pub fn stats(&self) -> &IngressCounters {
        &self.stats
    }

    /// Records a datagram received by this sampler.
    pub(crate) fn datagram_received(&self) {
        self.inflow.fetch_add(1, Ordering::Relaxed);
        self.stats.datagram_received();
    }

    /// Number of datagrams received by this sampler.
    pub fn inflow(&self) -> u64 {
        self.inflow.load(Ordering::Relaxed)
    }
}

/// Splits a datagram into lines and forwards every parsed update to the registry.
///
/// Returns the number of lines that parsed successfully, regardless of whether the registry knew
/// the metric. Lines that fail to parse are logged with their sender and counted as dropped.
///
/// A trailing newline does not produce an empty line, but empty lines in between do and fail to
/// parse. If the datagram was truncated, its unterminated last line is dropped as
/// [`ParseMetricError::TruncatedLine`].
pub fn split_datagram<R>(ctx: &SamplerContext<R>, datagram: RawDatagram<'_>) -> usize
where
    R: MetricRegistry,
{
    let RawDatagram {
        payload,
        from,
        truncated,
    } = datagram;

    let mut parsed = 0;
    let mut rest = payload;

    while !rest.is_empty() {
        let chunk = std::mem::take(&mut rest);
        let (line, complete) = match memchr::memchr(b'\n', chunk) {
            Some(pos) => {
                let (line, tail) = chunk.split_at_mut(pos);
                rest = &mut tail[1..];
                (line, true)
            }
            None => (chunk, false),
        };

        ctx.stats.line_observed();

        let result = if truncated && !complete {
            Err(ParseMetricError::TruncatedLine)
        } else {
            parse_line(line)
        };

        match result {
            Ok(update) => {
                if let Some(handle) = ctx.registry.lookup(update.key, update.ty) {
                    ctx.registry.record(&handle, update.value, update.sample_rate);
                }
                parsed += 1;
            }
            Err(error) => {
                sluice_log::warn!(
                    sampler = ctx.kind,
                    error = error.as_str(),
                    key = %String::from_utf8_lossy(line),
                    from = %from.map_or_else(|| "unknown".to_owned(), |addr| addr.to_string()),
                    "bad key"
                );
                ctx.stats.dropped();
            }
        }
    }

    parsed
}
