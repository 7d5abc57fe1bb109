//! Configuration for the Sluice CLI and server.
//!
//! Sluice reads a single configuration file in YAML or JSON format. The format is chosen by the
//! file extension. A minimal configuration declares one statsd sampler:
//!
//! ```yaml
//! logging:
//!   level: info
//! samplers:
//!   - type: statsd
//!     address: 0.0.0.0
//!     port: 8126
//!     workers: 4
//!     multimsg: 8
//! ```
//!
//! All sections other than `samplers` are optional and fall back to defaults.

#![warn(missing_docs)]

mod config;

pub use self::config::*;
