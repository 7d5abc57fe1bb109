use std::fmt;

/// The type of a [`MetricUpdate`], determining how it is aggregated downstream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MetricType {
    /// Stores absolute snapshots of values.
    ///
    /// Submitted with the type code `g`.
    Gauge,
    /// Measures the rate at which an event occurs.
    ///
    /// Submitted with the type code `C`.
    Meter,
    /// Counts instances of an event.
    ///
    /// Counters can be incremented and decremented. The default operation is to increment a counter
    /// by `1`, although increments by larger values are equally possible. Submitted with the type
    /// code `c`.
    Counter,
    /// Builds a statistical distribution over values reported.
    ///
    /// Submitted with the type code `h`.
    Histogram,
    /// Counts the number of unique reported values.
    ///
    /// Sets allow sending arbitrary discrete values, including strings. Submitted with the type
    /// code `s`.
    Set,
    /// Builds a distribution over durations.
    ///
    /// Submitted with the type code `ms`.
    Timer,
}

impl MetricType {
    /// Return the shortcode for this metric type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "g",
            MetricType::Meter => "C",
            MetricType::Counter => "c",
            MetricType::Histogram => "h",
            MetricType::Set => "s",
            MetricType::Timer => "ms",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed value of a [`MetricUpdate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue<'a> {
    /// A numeric value, used by all metric types except [sets](MetricType::Set).
    Number(f64),
    /// The raw value of a [set](MetricType::Set) metric.
    ///
    /// Set values are never interpreted numerically; the registry decides how to count them.
    Set(&'a str),
}

impl MetricValue<'_> {
    /// Returns the numeric value, or `None` for set values.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            MetricValue::Number(value) => Some(value),
            MetricValue::Set(_) => None,
        }
    }
}

impl fmt::Display for MetricValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(value) => value.fmt(f),
            MetricValue::Set(value) => value.fmt(f),
        }
    }
}

/// A single metric update parsed from one line of a datagram.
///
/// The update borrows its key and set values from the receive buffer. It must be consumed (looked
/// up and recorded) before the buffer is reused for the next datagram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricUpdate<'a> {
    /// The metric key, with spaces replaced by underscores.
    ///
    /// The key is never empty and never ends with a `.` separator.
    pub key: &'a str,
    /// The metric type.
    pub ty: MetricType,
    /// The value of the update.
    pub value: MetricValue<'a>,
    /// The fraction of true events this update statistically represents.
    ///
    /// Always within `(0.0, 1.0]`. Defaults to `1.0` if the submission does not carry a rate.
    pub sample_rate: f64,
}

/// An error returned by [`parse_line`](crate::parse_line).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ParseMetricError {
    /// The key is missing, empty, ends with a separator or is not valid UTF-8.
    #[error("malformed metric key")]
    MalformedKey,
    /// The type delimiter is missing or the type code is unknown.
    #[error("malformed metric type")]
    MalformedType,
    /// The sample rate is not a number in `(0.0, 1.0]`.
    #[error("malformed sample rate")]
    MalformedSampleRate,
    /// The value is not a number, or is followed by trailing garbage.
    #[error("malformed metric value")]
    MalformedValue,
    /// The line was cut off because its datagram exceeded the maximum packet size.
    #[error("truncated line")]
    TruncatedLine,
}

impl ParseMetricError {
    /// Returns a short identifier for this error, suitable for structured logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMetricError::MalformedKey => "malformed_key",
            ParseMetricError::MalformedType => "malformed_type",
            ParseMetricError::MalformedSampleRate => "malformed_sample_rate",
            ParseMetricError::MalformedValue => "malformed_value",
            ParseMetricError::TruncatedLine => "truncated_line",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_shortcodes() {
        let types = [
            MetricType::Gauge,
            MetricType::Meter,
            MetricType::Counter,
            MetricType::Histogram,
            MetricType::Set,
            MetricType::Timer,
        ];

        let codes: Vec<_> = types.iter().map(ToString::to_string).collect();
        assert_eq!(codes, ["g", "C", "c", "h", "s", "ms"]);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(MetricValue::Number(-5.5).to_string(), "-5.5");
        assert_eq!(MetricValue::Set("765").to_string(), "765");
        assert_eq!(MetricValue::Set("765").as_number(), None);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ParseMetricError::MalformedSampleRate.to_string(),
            "malformed sample rate"
        );
        assert_eq!(ParseMetricError::TruncatedLine.as_str(), "truncated_line");
    }
}
