//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::sync::{Locale, SyncConfig};

const DEFAULT_CONFIG_BASENAME: &str = "prenota";
const DEFAULT_API_BASE_URL: &str = "https://api.prenota.example/v1";
const DEFAULT_CHANNEL_URL: &str = "wss://push.prenota.example/subscribe";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Command-line arguments for the Prenota binary.
#[derive(Debug, Parser)]
#[command(name = "prenota", version, about = "Prenota data synchronization agent")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRENOTA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the headless synchronization agent.
    Watch(WatchArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct WatchArgs {
    /// Override the API base URL.
    #[arg(long = "api-base-url", value_name = "URL")]
    pub api_base_url: Option<String>,

    /// Override the push channel endpoint.
    #[arg(long = "channel-url", value_name = "URL")]
    pub channel_url: Option<String>,

    /// Override the request language tag (it, en, de).
    #[arg(long = "language", value_name = "TAG")]
    pub language: Option<String>,

    /// Seed the credential slot with an access token.
    #[arg(long = "access-token", env = "PRENOTA_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Seed the credential slot with a refresh token.
    #[arg(long = "refresh-token", env = "PRENOTA_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid url for `{field}`: {message}")]
    InvalidUrl { field: &'static str, message: String },
    #[error("unknown language tag `{0}` (expected it, en, or de)")]
    UnknownLanguage(String),
    #[error("unknown log level `{0}`")]
    UnknownLogLevel(String),
    #[error("unknown log format `{0}` (expected json or compact)")]
    UnknownLogFormat(String),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("transport initialization failed: {0}")]
    Transport(String),
}

/// Fully validated application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub transport: TransportSettings,
    pub sync: SyncConfig,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub api_base_url: Url,
    pub channel_url: Url,
    pub language: Locale,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Where the credential slot is persisted; in-memory when absent.
    pub credential_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

impl Settings {
    /// Load settings with file → environment → CLI precedence.
    pub fn load(cli: &CliArgs) -> Result<Self, LoadError> {
        let mut builder =
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false));
        if let Some(path) = &cli.config_file {
            builder = builder.add_source(File::from(path.clone()));
        }
        let raw: RawSettings = builder
            .add_source(Environment::with_prefix("PRENOTA").separator("__"))
            .build()?
            .try_deserialize()?;

        let mut settings = Self::from_raw(raw)?;
        if let Some(Command::Watch(args)) = &cli.command {
            settings.apply_watch_overrides(args)?;
        }
        Ok(settings)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let transport = TransportSettings {
            api_base_url: parse_url(
                "transport.api_base_url",
                raw.transport.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL),
            )?,
            channel_url: parse_url(
                "transport.channel_url",
                raw.transport.channel_url.as_deref().unwrap_or(DEFAULT_CHANNEL_URL),
            )?,
            language: match raw.transport.language.as_deref() {
                Some(tag) => parse_locale(tag)?,
                None => Locale::default(),
            },
            request_timeout: Duration::from_secs(
                raw.transport
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
                    .max(1),
            ),
        };

        let logging = LoggingSettings {
            level: match raw.logging.level.as_deref() {
                Some(level) => LevelFilter::from_str(level)
                    .map_err(|_| LoadError::UnknownLogLevel(level.to_string()))?,
                None => LevelFilter::INFO,
            },
            format: match raw.logging.format.as_deref() {
                Some("json") => LogFormat::Json,
                Some("compact") | None => LogFormat::Compact,
                Some(other) => return Err(LoadError::UnknownLogFormat(other.to_string())),
            },
        };

        Ok(Self {
            transport,
            sync: raw.sync,
            session: SessionSettings { credential_path: raw.session.credential_path },
            logging,
        })
    }

    fn apply_watch_overrides(&mut self, args: &WatchArgs) -> Result<(), LoadError> {
        if let Some(url) = &args.api_base_url {
            self.transport.api_base_url = parse_url("--api-base-url", url)?;
        }
        if let Some(url) = &args.channel_url {
            self.transport.channel_url = parse_url("--channel-url", url)?;
        }
        if let Some(tag) = &args.language {
            self.transport.language = parse_locale(tag)?;
        }
        Ok(())
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, LoadError> {
    Url::parse(value).map_err(|e| LoadError::InvalidUrl { field, message: e.to_string() })
}

fn parse_locale(tag: &str) -> Result<Locale, LoadError> {
    match tag {
        "it" => Ok(Locale::It),
        "en" => Ok(Locale::En),
        "de" => Ok(Locale::De),
        other => Err(LoadError::UnknownLanguage(other.to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    transport: RawTransportSettings,
    sync: SyncConfig,
    session: RawSessionSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTransportSettings {
    api_base_url: Option<String>,
    channel_url: Option<String>,
    language: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSessionSettings {
    credential_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    format: Option<String>,
}

#[cfg(test)]
mod tests;
