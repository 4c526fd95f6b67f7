mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use callbook_api::auth::{AppState, AppStateInner};
use callbook_core::providers::{
    HostedCheckoutGateway, JwtRoomProvider, LogChannel, NotificationChannel, PaymentGateways,
    TelegramChannel,
};
use callbook_core::{Providers, Services, SystemClock};
use callbook_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callbook=debug,callbook_core=debug,tower_http=debug".into()),
        )
        .init();

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let services = Services::new(
        db,
        Arc::new(SystemClock),
        config.policy.clone(),
        providers(&config),
    );
    let worker = Arc::new(services.worker(config.worker.clone()));
    if config.worker_enabled {
        worker.start();
    } else {
        info!("Background worker disabled");
    }

    let state: AppState = Arc::new(AppStateInner {
        services,
        worker: worker.clone(),
        jwt_secret: config.jwt_secret.clone(),
        admin_token: config.admin_token.clone(),
        webhook_secret: config.webhook_secret.clone(),
    });
    if config.webhook_secret.is_none() {
        warn!("CALLBOOK_WEBHOOK_SECRET is unset; payment webhooks are not verified");
    }

    let app = callbook_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Callbook server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.stop().await;
    Ok(())
}

fn providers(config: &Config) -> Providers {
    let mut payments = PaymentGateways::new();
    for p in &config.payment_providers {
        info!("Payment provider {} -> {}", p.name, p.checkout_url);
        payments = payments.with(Arc::new(HostedCheckoutGateway::new(
            p.name.clone(),
            p.checkout_url.clone(),
            config.payment_signing_secret.clone(),
        )));
    }
    if config.payment_providers.is_empty() {
        warn!("No payment providers configured; payment links cannot be created");
    }

    let channel: Arc<dyn NotificationChannel> = match &config.telegram_bot_token {
        Some(token) => Arc::new(TelegramChannel::new(token)),
        None => {
            info!("No Telegram bot token; notifications are only logged");
            Arc::new(LogChannel)
        }
    };

    Providers {
        payments,
        rooms: Arc::new(JwtRoomProvider::new(
            config.room_base_url.clone(),
            config.room_app_id.clone(),
            config.room_secret.clone(),
        )),
        channel,
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
