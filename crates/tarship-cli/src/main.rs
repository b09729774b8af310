//! tarship - push exported container image archives to a registry.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tarship_push::{ImagePusher, PushConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Push a docker-save image archive to a registry without a container runtime
#[derive(Parser)]
#[command(name = "tarship")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the exported image archive (tarball)
    pub archive: PathBuf,

    /// Registry base endpoint, e.g. https://registry.example:5000
    #[arg(long)]
    pub registry: String,

    /// Registry username
    #[arg(short, long, default_value = "")]
    pub username: String,

    /// Registry password
    #[arg(short, long, default_value = "")]
    pub password: String,

    /// Accept self-signed registry certificates
    #[arg(long)]
    pub skip_tls_verify: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    let filter = if cli.debug {
        "tarship=debug,tarship_push=debug"
    } else {
        "tarship=info,tarship_push=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = PushConfig {
        archive_path: cli.archive,
        registry_endpoint: cli.registry,
        username: cli.username,
        password: cli.password,
        skip_tls_verify: cli.skip_tls_verify,
    };

    let pusher = ImagePusher::from_config(&config);
    pusher.push(&config.archive_path).await?;

    Ok(())
}
