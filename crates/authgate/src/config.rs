//! Process configuration
//!
//! Operational knobs come from an optional YAML file with environment
//! variables layered on top; env always wins. The catalog of protected APIs
//! is a separate document (see `types::local`) referenced by path here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt};

use anyhow::Context;
use serde::Deserialize;

use crate::telemetry;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:50051";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// The YAML shape operators write.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
    /// gRPC bind address in the form "ip:port".
    listen_addr: Option<String>,
    /// Path to the catalog document.
    catalog_path: Option<PathBuf>,
    /// Per-request deadline for the full pipeline.
    request_timeout_ms: Option<u64>,
    logging: Option<RawLogging>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawLogging {
    level: Option<String>,
    format: Option<telemetry::LoggingFormat>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub catalog_path: PathBuf,
    pub request_timeout: Duration,
    pub logging: telemetry::Config,
}

/// Layer env overrides over the optional config file contents.
pub fn parse_config(
    contents: Option<String>,
    catalog_flag: Option<PathBuf>,
) -> anyhow::Result<Config> {
    let raw: RawConfig = match contents {
        Some(contents) => serde_yaml::from_str(&contents).context("parsing config file")?,
        None => RawConfig::default(),
    };

    let listen_addr = match parse::<SocketAddr>("LISTEN_ADDR")? {
        Some(addr) => addr,
        None => raw
            .listen_addr
            .as_deref()
            .unwrap_or(DEFAULT_LISTEN_ADDR)
            .parse()
            .context("invalid listen address")?,
    };

    let catalog_path = parse::<PathBuf>("CATALOG_PATH")?
        .or(catalog_flag)
        .or(raw.catalog_path)
        .context("a catalog path is required (--catalog, CATALOG_PATH, or catalogPath)")?;

    let request_timeout = Duration::from_millis(
        parse::<u64>("REQUEST_TIMEOUT_MS")?
            .or(raw.request_timeout_ms)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
    );

    let raw_logging = raw.logging.unwrap_or_default();
    let logging = telemetry::Config {
        level: parse::<String>("LOG_LEVEL")?
            .or(raw_logging.level)
            .unwrap_or_else(|| "info".to_string()),
        format: parse::<telemetry::LoggingFormat>("LOG_FORMAT")?
            .or(raw_logging.format)
            .unwrap_or_default(),
    };

    Ok(Config {
        listen_addr,
        catalog_path,
        request_timeout,
        logging,
    })
}

/// Read and parse one env var; unset or empty means "not provided".
fn parse<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {name}: {e}")),
        _ => Ok(None),
    }
}
