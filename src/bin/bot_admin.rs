//! Админ-бот: файлы, планы, заказы, настройки, рассылки.

use std::path::PathBuf;
use std::sync::Arc;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;

use filegate::bot::{self, BotState};
use filegate::clock::SystemClock;
use filegate::config::Config;
use filegate::db::Db;
use filegate::verification::VerificationProtocol;

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
    tracing::info!("Starting admin bot with config {}", config_path.display());

    let config = Arc::new(Config::load(&config_path)?);
    let db = Arc::new(Db::open(&config.db_path).await?);
    let clock: Arc<dyn filegate::clock::Clock> = Arc::new(SystemClock);
    let protocol = Arc::new(VerificationProtocol::new(
        &config.token_secret,
        Arc::clone(&db),
        Arc::clone(&clock),
        config.free_access_hours,
    ));

    let bot = Bot::new(config.admin_bot_token.clone());
    // Уведомления пользователям и рассылки идут от пользовательского бота.
    let user_bot = Bot::new(config.user_bot_token.clone());
    let state = BotState {
        config,
        db,
        protocol,
        clock,
        user_bot,
    };
    tracing::info!("Dispatcher initialized, admin bot is ready");

    Dispatcher::builder(bot, bot::admin::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
