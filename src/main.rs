use std::sync::Arc;

use futures::StreamExt;
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use survey_bot::api::{ApiState, survey_routes};
use survey_bot::bot::Dispatcher;
use survey_bot::channels::{Messenger, TelegramBot};
use survey_bot::config::AppConfig;
use survey_bot::locale;
use survey_bot::store::{Database, LibSqlBackend};
use survey_bot::survey::QuestionSequencer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC...");
            std::process::exit(1);
        }
    };

    eprintln!("📋 Survey Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Admin API: http://0.0.0.0:{}/api/telegram/survey", config.http_port);

    // ── Store ───────────────────────────────────────────────────────────
    let backend = LibSqlBackend::new_local(&config.db_path).await?;
    let db: Arc<dyn Database> = Arc::new(backend);

    if let Some(admin) = &config.bootstrap_admin {
        db.upsert_admin_token(admin.token.expose_secret(), &admin.admin_id)
            .await?;
        info!(admin_id = %admin.admin_id, "Bootstrap admin token registered");
    }

    // ── Telegram ────────────────────────────────────────────────────────
    let bot = TelegramBot::new(config.bot_token.clone(), config.poll_timeout);
    bot.health_check().await?;

    if let Err(e) = bot
        .set_my_commands(&[
            ("auth", locale::AUTH_COMMAND_DESCRIPTION),
            ("join", locale::JOIN_COMMAND_DESCRIPTION),
        ])
        .await
    {
        warn!(error = %e, "Failed to register bot commands");
    }

    let messenger: Arc<dyn Messenger> = Arc::new(bot.clone());
    let dispatcher = Dispatcher::new(Arc::clone(&db), Arc::clone(&messenger));

    // ── Admin API ───────────────────────────────────────────────────────
    let app = survey_routes(ApiState {
        db: Arc::clone(&db),
        sequencer: QuestionSequencer::new(Arc::clone(&db), Arc::clone(&messenger)),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    info!(port = config.http_port, "Admin API listening");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    // ── Update loop ─────────────────────────────────────────────────────
    let mut updates = bot.updates();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Shutdown requested");
                break;
            }
            update = updates.next() => {
                let Some(update) = update else {
                    warn!("Telegram update stream ended");
                    break;
                };
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.handle(update).await {
                        error!(error = %e, "Failed to handle Telegram update");
                    }
                });
            }
        }
    }

    // The poller exits on its next delivery attempt once the stream is gone,
    // which can be up to one long-poll timeout later.
    drop(updates);
    let _ = shutdown_tx.send(true);
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Admin API server failed"),
        Err(e) => error!(error = %e, "Admin API task panicked"),
    }

    info!("Survey bot stopped");
    Ok(())
}
