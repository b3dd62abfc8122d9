use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use authgate::{app, config, telemetry};

#[derive(Parser)]
#[command(name = "authgate", version, about = "Envoy external authorization service")]
struct Args {
    /// Path to the service config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the catalog of protected APIs (overrides the config file)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let contents = match &args.config {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?,
        ),
        None => None,
    };
    let config = config::parse_config(contents, args.catalog)?;

    telemetry::init(&config.logging)?;
    app::run(config).await
}
