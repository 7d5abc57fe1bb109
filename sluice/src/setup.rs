use anyhow::{Context, Result};
use sluice_config::{Config, SamplerConfig};

/// Validates the config before starting any samplers.
pub fn check_config(config: &Config) -> Result<()> {
    config.validate().context("invalid configuration")?;
    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    sluice_log::info!(
        "launching sluice {} from config file {}",
        env!("CARGO_PKG_VERSION"),
        config.path().display()
    );
    sluice_log::info!("  log level: {}", config.logging().level);

    for sampler in config.samplers() {
        match sampler {
            SamplerConfig::Statsd(statsd) => sluice_log::info!(
                "  {} sampler: {} ({} workers, multimsg {})",
                sampler.kind(),
                statsd.socket_addr(),
                statsd.workers,
                statsd.multimsg
            ),
        }
    }
}

/// Initialize the logging system.
pub fn init_logging(config: &Config) {
    sluice_log::init(config.logging());
}
