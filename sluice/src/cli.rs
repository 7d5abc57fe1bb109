use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;
use sluice_config::{Config, OverridableConfig, SamplerConfig};

use crate::cliapp::make_app;
use crate::setup;

/// Extracts the config overrides from the command line.
fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        log_level: matches.get_one::<String>("log_level").cloned(),
        log_format: matches.get_one::<String>("log_format").cloned(),
    }
}

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .context("no config path given")?;

    let mut config = Config::from_path(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    config.apply_override(extract_config_args(&matches))?;

    match matches.subcommand() {
        Some(("config", matches)) => manage_config(&config, matches),
        Some(("run", _)) | None => run(config),
        _ => unreachable!(),
    }
}

pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("check", matches)) => check_config(config, matches.get_flag("quiet")),
        _ => unreachable!(),
    }
}

#[allow(clippy::print_stdout)]
pub fn check_config(config: &Config, quiet: bool) -> Result<()> {
    setup::check_config(config)?;

    if quiet {
        return Ok(());
    }

    println!("config file: {}", config.path().display());
    println!("log level: {}", config.logging().level);
    match config.stats_interval() {
        Some(interval) => println!("stats interval: {}s", interval.as_secs()),
        None => println!("stats interval: disabled"),
    }

    for sampler in config.samplers() {
        match sampler {
            SamplerConfig::Statsd(statsd) => println!(
                "sampler {}: {} workers={} multimsg={} multisock={} max_packet_size={}",
                sampler.kind(),
                statsd.socket_addr(),
                statsd.workers,
                statsd.multimsg,
                statsd.multisock,
                statsd.max_packet_size,
            ),
        }
    }

    println!("config ok");
    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::init_logging(&config);
    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);

    sluice_server::run(config)?;

    Ok(())
}
