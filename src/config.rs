use std::{fs::read_to_string, str::FromStr};

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Sizing limits the server enforces on every incoming request and
/// advertises to clients via `on_ready`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub struct Limits {
    ///
    /// Largest serialized request the server will accept.
    ///
    #[serde(default = "Limits::max_request_size")]
    pub max_request_size: u32,
    ///
    /// Largest response size a client may ask for.
    ///
    #[serde(default = "Limits::max_response_size")]
    pub max_response_size: u32,
    ///
    /// A request whose `max_response_size`, after the RSI stack, would leave
    /// less than this many bytes for payload is rejected outright rather
    /// than dispatched and truncated.
    ///
    #[serde(default = "Limits::min_useful_response_size")]
    pub min_useful_response_size: u32,
}

impl Limits {
    fn max_request_size() -> u32 {
        1500
    }

    fn max_response_size() -> u32 {
        1500
    }

    fn min_useful_response_size() -> u32 {
        8
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_size: Self::max_request_size(),
            max_response_size: Self::max_response_size(),
            min_useful_response_size: Self::min_useful_response_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    ///
    /// Specify the configuration file path.
    ///
    /// Example: roda-server --config /etc/roda-server/config.json5
    ///
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    ///
    /// Load configuration from the command-line-specified file, or fall
    /// back to built-in defaults if no path was given.
    ///
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();

        Ok(match cli.config {
            Some(path) => serde_json5::from_str(&read_to_string(path)?)?,
            None => Self::default(),
        })
    }
}
