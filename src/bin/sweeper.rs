//! Sweeper: один полный проход фоновых чисток. Запускается по cron или
//! systemd-таймеру раз в минуту.

use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;

use filegate::clock::{Clock, SystemClock};
use filegate::config::Config;
use filegate::db::Db;
use filegate::jobs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/filegate.toml"));
    tracing::info!("Starting sweeper with config {}", config_path.display());

    let config = Arc::new(Config::load(&config_path)?);
    let db = Db::open(&config.db_path).await?;
    // Сообщения удаляются из чатов пользовательского бота, его токеном.
    let bot = Bot::new(config.user_bot_token.clone());

    jobs::run_all(&bot, &db, &config, SystemClock.now()).await?;
    tracing::info!("sweep finished");

    Ok(())
}
