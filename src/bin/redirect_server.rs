//! Redirect-сервер: страница отсчёта и возврат в бот.

use std::path::PathBuf;
use std::sync::Arc;

use filegate::clock::SystemClock;
use filegate::config::Config;
use filegate::db::Db;
use filegate::redirect::{self, RedirectState};
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
    tracing::info!(
        "Starting redirect server with config {}",
        config_path.display()
    );

    let config = Arc::new(Config::load(&config_path)?);
    let db = Arc::new(Db::open(&config.db_path).await?);
    let clock: Arc<dyn filegate::clock::Clock> = Arc::new(SystemClock);
    let protocol = Arc::new(VerificationProtocol::new(
        &config.token_secret,
        Arc::clone(&db),
        clock,
        config.free_access_hours,
    ));

    let listen_addr = config.listen_addr.clone();
    let app = redirect::router(RedirectState { protocol, config });

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "redirect server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
