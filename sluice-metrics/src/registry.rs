use crate::protocol::{MetricType, MetricValue};

/// Aggregation backend that receives parsed metric updates.
///
/// Receive workers call into the registry concurrently from several threads, once per parsed
/// line, so both methods must be cheap and must never block.
pub trait MetricRegistry: Send + Sync {
    /// A resolved reference to a registered metric.
    type Handle;

    /// Resolves a metric by key and type.
    ///
    /// Returns `None` if no matching metric is registered. This is not an error, the update is
    /// skipped silently.
    fn lookup(&self, key: &str, ty: MetricType) -> Option<Self::Handle>;

    /// Records a value for a previously resolved metric.
    fn record(&self, handle: &Self::Handle, value: MetricValue<'_>, sample_rate: f64);
}

/// A registry that never resolves any metric.
///
/// Used when Sluice runs standalone without an aggregation backend. Updates are parsed and
/// counted, but not recorded anywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRegistry;

impl MetricRegistry for NoopRegistry {
    type Handle = ();

    fn lookup(&self, _key: &str, _ty: MetricType) -> Option<Self::Handle> {
        None
    }

    fn record(&self, _handle: &Self::Handle, _value: MetricValue<'_>, _sample_rate: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_never_resolves() {
        assert_eq!(NoopRegistry.lookup("gorets", MetricType::Counter), None);
    }
}
