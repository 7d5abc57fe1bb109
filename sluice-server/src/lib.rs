//! The statsd ingestion server.
//!
//! A [`Server`] runs one or more samplers. Every sampler binds a UDP address and runs a pool of
//! worker threads, each looping over the same steps:
//!
//!  1. Receive one or more datagrams into reusable buffers, using the [`ReceiveStrategy`] chosen at
//!     startup (`recvmmsg` batches on Linux, `recv_from` elsewhere).
//!  2. Split every datagram into lines with [`split_datagram`].
//!  3. Parse each line in place and hand the update to the [`MetricRegistry`].
//!
//! Malformed lines and failed reads never stop a worker. They are logged and counted in the shared
//! [`IngressCounters`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sluice_config::Config;
//! use sluice_metrics::NoopRegistry;
//! use sluice_server::Server;
//!
//! let config = Config::from_path("sluice.yml")?;
//! let server = Server::start(&config, Arc::new(NoopRegistry))?;
//! // ...
//! server.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`MetricRegistry`]: sluice_metrics::MetricRegistry

#![warn(missing_docs)]

mod receive;
mod sampler;
mod server;
mod socket;
mod split;
mod stats;

pub use self::receive::*;
pub use self::sampler::*;
pub use self::server::*;
pub use self::socket::*;
pub use self::split::*;
pub use self::stats::*;
