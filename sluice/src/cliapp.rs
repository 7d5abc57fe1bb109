//! This module implements the definition of the command line app.

use std::path::PathBuf;

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Sluice receives statsd metrics over UDP and feeds them to aggregation.";

pub fn make_app() -> Command {
    Command::new("sluice")
        .disable_help_subcommand(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("SLUICE_CONFIG")
                .default_value("sluice.yml")
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config file (YAML or JSON)."),
        )
        .arg(
            Arg::new("log_level")
                .value_name("LEVEL")
                .long("log-level")
                .global(true)
                .value_parser(ValueParser::string())
                .help("Overrides the log level: error, warn, info, debug, trace or off."),
        )
        .arg(
            Arg::new("log_format")
                .value_name("FORMAT")
                .long("log-format")
                .global(true)
                .value_parser(["auto", "pretty", "simplified", "json"])
                .help("Overrides the log format."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the daemon (default)")
                .after_help(
                    "This runs Sluice in the foreground until it receives Ctrl-C or SIGTERM. \
                     It binds every sampler configured in the config file.",
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the config file")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("check")
                        .about("Validate the config file")
                        .after_help(
                            "This loads and validates the config file and prints the \
                             configured samplers.  Exits with a non-zero status if the \
                             config is invalid.",
                        )
                        .arg(
                            Arg::new("quiet")
                                .long("quiet")
                                .short('q')
                                .action(ArgAction::SetTrue)
                                .help("Only report errors"),
                        ),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app() {
        make_app().debug_assert();
    }

    #[test]
    fn test_defaults_to_run() {
        let matches = make_app().try_get_matches_from(["sluice"]).unwrap();
        assert!(matches.subcommand().is_none());
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("sluice.yml"))
        );
    }

    #[test]
    fn test_global_overrides() {
        let matches = make_app()
            .try_get_matches_from([
                "sluice",
                "config",
                "check",
                "--log-level",
                "debug",
                "-c",
                "x.json",
            ])
            .unwrap();

        assert_eq!(
            matches.get_one::<String>("log_level").map(String::as_str),
            Some("debug")
        );
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("x.json"))
        );
    }

    #[test]
    fn test_bad_log_format() {
        assert!(
            make_app()
                .try_get_matches_from(["sluice", "--log-format", "xml"])
                .is_err()
        );
    }
}
