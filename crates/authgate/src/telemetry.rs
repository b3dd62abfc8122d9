//! Logging bootstrap

use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LoggingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LoggingFormat::Text),
            "json" => Ok(LoggingFormat::Json),
            other => Err(format!("unknown logging format {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Default filter directives; `RUST_LOG` wins when set.
    pub level: String,
    pub format: LoggingFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LoggingFormat::Text,
        }
    }
}

pub fn init(config: &Config) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LoggingFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LoggingFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}
