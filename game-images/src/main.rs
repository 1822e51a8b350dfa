// game-images - public image server
// Entry point and configuration parsing

use anyhow::{Context, Result};
use clap::Parser;
use game_images::config::{
    RateLimitConfig, ServerConfig, BURST_LIMIT, DEFAULT_BIND_ADDR, DEFAULT_DATABASE_PATH,
    DEFAULT_MAX_IMAGE_BYTES, DEFAULT_PUBLIC_BASE_URL, SUSTAINED_LIMIT,
};
use game_images::{app, server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "game-images")]
#[command(about = "Public image server for scheduled games")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_BIND_ADDR, env = "GAME_IMAGES_BIND")]
    bind: SocketAddr,

    /// SQLite database file.
    #[arg(long, default_value = DEFAULT_DATABASE_PATH, env = "GAME_IMAGES_DATABASE")]
    database: PathBuf,

    /// Base URL used when building public image links.
    #[arg(long, default_value = DEFAULT_PUBLIC_BASE_URL, env = "GAME_IMAGES_PUBLIC_BASE_URL")]
    public_base_url: String,

    /// Largest accepted image upload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_IMAGE_BYTES, env = "GAME_IMAGES_MAX_IMAGE_BYTES")]
    max_image_bytes: usize,

    /// Requests per client allowed in the burst window.
    #[arg(long, default_value_t = BURST_LIMIT, env = "GAME_IMAGES_BURST_LIMIT")]
    burst_limit: usize,

    /// Burst window in seconds.
    #[arg(long, default_value_t = 60, env = "GAME_IMAGES_BURST_WINDOW_SECS")]
    burst_window_secs: u64,

    /// Requests per client allowed in the sustained window.
    #[arg(long, default_value_t = SUSTAINED_LIMIT, env = "GAME_IMAGES_SUSTAINED_LIMIT")]
    sustained_limit: usize,

    /// Sustained window in seconds.
    #[arg(long, default_value_t = 300, env = "GAME_IMAGES_SUSTAINED_WINDOW_SECS")]
    sustained_window_secs: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            database_path: self.database,
            public_base_url: self.public_base_url,
            max_image_bytes: self.max_image_bytes,
            rate_limit: RateLimitConfig {
                burst_limit: self.burst_limit,
                burst_window: Duration::from_secs(self.burst_window_secs),
                sustained_limit: self.sustained_limit,
                sustained_window: Duration::from_secs(self.sustained_window_secs),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_images=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config();
    let bind = config.bind;

    tracing::info!(
        bind = %bind,
        public_base_url = %config.public_base_url,
        max_image_bytes = config.max_image_bytes,
        burst_limit = config.rate_limit.burst_limit,
        sustained_limit = config.rate_limit.sustained_limit,
        "Starting game-images server"
    );

    let state = app::setup(config)
        .await
        .context("failed to initialize application")?;

    server::serve(state, bind).await.context("server error")?;

    Ok(())
}
