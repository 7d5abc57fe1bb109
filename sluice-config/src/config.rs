use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_log::{Level, LogConfig, LogFormat};

/// The largest number of datagrams a single batched receive call may fill.
pub const MAX_MULTIMSG: usize = 1024;

/// The smallest supported maximum packet size in bytes.
pub const MIN_PACKET_SIZE: usize = 16;

/// The largest supported maximum packet size in bytes, the ceiling of a UDP payload.
pub const MAX_PACKET_SIZE: usize = 65_535;

/// Defines the source of a config error
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating from a specific field, either in the file or from an override.
    Field(String),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    source: ConfigErrorSource,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            kind,
            source: ConfigErrorSource::None,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(cause)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: impl Into<String>) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(path.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: impl Into<String>) -> Self {
        self.source = ConfigErrorSource::Field(name.into());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::Field(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// The configuration does not declare a single sampler.
    #[error("no samplers configured")]
    NoSamplers,
}

/// A plain message used as the cause of validation errors.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct InvalidValue(String);

enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Picks the format from the file extension, defaulting to YAML.
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The log level, one of `error`, `warn`, `info`, `debug`, `trace` or `off`.
    pub log_level: Option<String>,
    /// The log format, one of `auto`, `pretty`, `simplified` or `json`.
    pub log_format: Option<String>,
}

/// Controls the server itself.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct ServerConfig {
    /// Interval in seconds at which ingress counters are logged.
    ///
    /// Defaults to `60`. A value of `0` disables periodic reporting.
    stats_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { stats_interval: 60 }
    }
}

fn default_workers() -> usize {
    4
}

fn default_multimsg() -> usize {
    1
}

fn default_max_packet_size() -> usize {
    1500
}

/// Configuration of a statsd sampler listening on a UDP address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsdConfig {
    /// The address to bind to.
    pub address: IpAddr,
    /// The UDP port to bind to. `0` picks an ephemeral port.
    pub port: u16,
    /// The number of receive workers.
    ///
    /// Defaults to `4`.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// The number of datagrams received per system call.
    ///
    /// Values above `1` enable batched receiving where the platform supports it. Defaults to `1`.
    #[serde(default = "default_multimsg")]
    pub multimsg: usize,
    /// Gives every worker its own socket bound with `SO_REUSEPORT`.
    ///
    /// Ignored on platforms without port reuse. Defaults to `false`.
    #[serde(default)]
    pub multisock: bool,
    /// The largest datagram payload accepted in bytes. Longer datagrams are truncated.
    ///
    /// The limit counts payload bytes only. No byte is reserved for a line terminator, so a full
    /// `1500` byte datagram is accepted with the default. Must be between `16` and `65535`.
    ///
    /// Defaults to `1500`.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
    /// Size of the kernel receive buffer in bytes.
    ///
    /// Defaults to the system default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_buffer_size: Option<usize>,
}

impl StatsdConfig {
    /// Creates a config for the given address with default settings.
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            workers: default_workers(),
            multimsg: default_multimsg(),
            multisock: false,
            max_packet_size: default_max_packet_size(),
            recv_buffer_size: None,
        }
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Checks the bounds of all settings.
    ///
    /// Errors name the offending field relative to this sampler.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers", "at least one worker is required"));
        }

        if !(1..=MAX_MULTIMSG).contains(&self.multimsg) {
            return Err(invalid(
                "multimsg",
                format!("must be between 1 and {MAX_MULTIMSG}"),
            ));
        }

        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&self.max_packet_size) {
            return Err(invalid(
                "max_packet_size",
                format!("must be between {MIN_PACKET_SIZE} and {MAX_PACKET_SIZE} bytes"),
            ));
        }

        if self.recv_buffer_size == Some(0) {
            return Err(invalid("recv_buffer_size", "must not be zero"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::for_field(InvalidValue(message.into()), field)
}

/// Configuration of a single sampler, tagged by its `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SamplerConfig {
    /// A plain text statsd sampler over UDP.
    Statsd(StatsdConfig),
}

impl SamplerConfig {
    /// Returns the name of the sampler type.
    pub fn kind(&self) -> &'static str {
        match self {
            SamplerConfig::Statsd(_) => "statsd",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SamplerConfig::Statsd(statsd) => statsd.validate(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    samplers: Vec<SamplerConfig>,
}

/// Config struct.
#[derive(Debug)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from the given file.
    ///
    /// Files ending in `.json` are parsed as JSON, all others as YAML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let file = fs::File::open(path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(path))?;
        let reader = io::BufReader::new(file);

        let values = match ConfigFormat::from_path(path) {
            ConfigFormat::Yaml => serde_yaml::from_reader(reader)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(path))?,
            ConfigFormat::Json => serde_json::from_reader(reader)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadJson).file(path))?,
        };

        Ok(Config {
            values,
            path: path.to_path_buf(),
        })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let logging = &mut self.values.logging;

        if let Some(level) = overrides.log_level {
            logging.level = level
                .parse::<Level>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        if let Some(format) = overrides.log_format {
            logging.format = format
                .parse::<LogFormat>()
                .map_err(|err| ConfigError::for_field(err, "log_format"))?;
        }

        Ok(self)
    }

    /// Checks that at least one sampler is configured and all samplers are valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.values.samplers.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::NoSamplers).field("samplers"));
        }

        for (index, sampler) in self.values.samplers.iter().enumerate() {
            sampler.validate().map_err(|mut err| {
                if let ConfigErrorSource::Field(name) = &err.source {
                    err.source = ConfigErrorSource::Field(format!("samplers[{index}].{name}"));
                }
                err
            })?;
        }

        Ok(())
    }

    /// Returns the path of the file this config was loaded from.
    ///
    /// Empty for configs that were not loaded from a file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the interval at which ingress counters are reported.
    ///
    /// `None` if periodic reporting is disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        match self.values.server.stats_interval {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Returns all configured samplers.
    pub fn samplers(&self) -> &[SamplerConfig] {
        &self.values.samplers
    }
}
