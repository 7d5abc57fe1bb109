//! Statsd wire protocol for Sluice.
//!
//! Clients submit metric updates as newline separated lines within UDP datagrams. Every line
//! carries exactly one update:
//!
//! ```text
//! <key>:<value>|<type>[|@<sample_rate>]
//! ```
//!
//! An example submission looks like this:
//!
//! ```text
//! api.requests:1|c|@0.1
//! api.response_time:57|ms
//! api.users:4711|s
//! ```
//!
//! This crate contains the types describing a single update ([`MetricUpdate`], [`MetricType`],
//! [`MetricValue`]), the line parser [`parse_line`], and the [`MetricRegistry`] interface through
//! which parsed updates are handed to aggregation.
//!
//! # Parsing
//!
//! Parsing happens in place on the receive buffer. The parser rewrites spaces in keys to
//! underscores and returns an update that borrows from the line, so no bytes are copied:
//!
//! ```
//! use sluice_metrics::{MetricType, MetricValue, parse_line};
//!
//! let mut line = *b"api.requests:1|c|@0.1";
//! let update = parse_line(&mut line).expect("metric should parse");
//!
//! assert_eq!(update.key, "api.requests");
//! assert_eq!(update.ty, MetricType::Counter);
//! assert_eq!(update.value, MetricValue::Number(1.0));
//! assert_eq!(update.sample_rate, 0.1);
//! ```

#![warn(missing_docs)]

mod parse;
mod protocol;
mod registry;

pub use self::parse::*;
pub use self::protocol::*;
pub use self::registry::*;
