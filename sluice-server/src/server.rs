use std::io;
use std::sync::Arc;
use std::time::Duration;

use sluice_config::{Config, ConfigError, SamplerConfig};
use sluice_log::LogError;
use sluice_metrics::MetricRegistry;

use crate::sampler::{SamplerError, StatsdSampler};
use crate::stats::{IngressCounters, IngressSnapshot};

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration does not describe a runnable server.
    #[error("invalid configuration")]
    Config(#[source] ConfigError),

    /// A sampler could not be started.
    #[error("could not start {kind} sampler")]
    SamplerFailed {
        /// The kind of sampler that failed.
        kind: &'static str,
        /// The startup error.
        #[source]
        source: SamplerError,
    },

    /// The async runtime could not be created.
    #[error("could not create the runtime")]
    RuntimeFailed(#[source] io::Error),
}

/// All samplers of a running process, sharing one set of ingress counters.
#[derive(Debug)]
pub struct Server<R> {
    samplers: Vec<StatsdSampler<R>>,
    stats: Arc<IngressCounters>,
}

impl<R> Server<R>
where
    R: MetricRegistry + 'static,
{
    /// Starts one sampler for every configured sampler entry.
    ///
    /// If any sampler fails to start, the samplers started before it are shut down again.
    pub fn start(config: &Config, registry: Arc<R>) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;

        let stats = Arc::new(IngressCounters::new());
        let mut samplers = Vec::with_capacity(config.samplers().len());

        for sampler_config in config.samplers() {
            let sampler = match sampler_config {
                SamplerConfig::Statsd(statsd) => {
                    StatsdSampler::start(statsd, Arc::clone(&registry), Arc::clone(&stats))
                }
            }
            .map_err(|source| ServerError::SamplerFailed {
                kind: sampler_config.kind(),
                source,
            })?;

            sluice_log::info!(
                sampler = sampler.kind(),
                address = %sampler.local_addr(),
                workers = sampler.workers(),
                "sampler started"
            );

            samplers.push(sampler);
        }

        Ok(Self { samplers, stats })
    }
}

impl<R> Server<R> {
    /// The running samplers.
    pub fn samplers(&self) -> &[StatsdSampler<R>] {
        &self.samplers
    }

    /// Returns the current ingress counters of all samplers combined.
    pub fn stats(&self) -> IngressSnapshot {
        self.stats.snapshot()
    }

    /// Shuts down all samplers and waits for their workers to exit.
    pub fn shutdown(self) {
        for sampler in self.samplers {
            sampler.shutdown();
        }
    }
}

fn log_stats<R>(server: &Server<R>, message: &str) {
    let stats = server.stats();
    let inflow: u64 = server.samplers().iter().map(StatsdSampler::inflow).sum();

    sluice_log::info!(
        datagrams = stats.datagrams,
        lines = stats.lines,
        dropped = stats.dropped,
        inflow,
        "{message}"
    );
}

/// Completes when the process receives Ctrl-C or, on Unix, `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            sluice_log::error!(error = %LogError(&error), "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                sluice_log::error!(error = %LogError(&error), "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Logs the ingress counters every `interval` until a shutdown signal arrives.
async fn serve<R>(server: &Server<R>, interval: Option<Duration>) {
    let Some(interval) = interval else {
        return shutdown_signal().await;
    };

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => log_stats(server, "ingress stats"),
        }
    }
}

/// Runs the standalone daemon until it receives a shutdown signal.
///
/// Parsed updates are not recorded anywhere, the daemon only reports how many lines it received
/// and dropped.
pub fn run(config: Config) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ServerError::RuntimeFailed)?;

    let server = Server::start(&config, Arc::new(sluice_metrics::NoopRegistry))?;

    runtime.block_on(serve(&server, config.stats_interval()));

    sluice_log::info!("shutting down");
    log_stats(&server, "final ingress stats");
    server.shutdown();

    Ok(())
}
