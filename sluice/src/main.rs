//! Sluice is a statsd ingestion daemon. It receives metric submissions in the plain text statsd
//! protocol over UDP, parses them in place and hands every update to a metric registry for
//! aggregation.
//!
//! # Workspace Crates
//!
//! Sluice is split into the following workspace crates:
//!
//!  - `sluice`: Main entry point and command line interface.
//!  - [`sluice-config`]: Static configuration for the CLI and server.
//!  - [`sluice-log`]: Logging setup and facade.
//!  - [`sluice-metrics`]: Statsd wire protocol and the metric registry interface.
//!  - [`sluice-server`]: Sockets, receive workers and line splitting.
//!
//! [`sluice-config`]: ../sluice_config/index.html
//! [`sluice-log`]: ../sluice_log/index.html
//! [`sluice-metrics`]: ../sluice_metrics/index.html
//! [`sluice-server`]: ../sluice_server/index.html

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            sluice_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
