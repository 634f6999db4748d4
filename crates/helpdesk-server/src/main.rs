mod config;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use helpdesk_api::{AppState, AppStateInner};
use helpdesk_core::{Helpdesk, Notifier, ScanJob, Scheduler, SlaPolicy, SlaScan, SubscriptionScan, Trigger};
use helpdesk_db::Database;
use helpdesk_gateway::{Dispatcher, WebhookNotifier, connection};
use helpdesk_types::UserId;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "helpdesk_server=debug,helpdesk_core=debug,helpdesk_api=debug,helpdesk_gateway=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    info!(staff = config.staff_ids.len(), "Loaded configuration");

    let store = Arc::new(Database::open(&config.db_path)?);

    // Outbound transport: webhook relay if configured, otherwise the websocket mailbox
    let dispatcher = Dispatcher::new();
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => {
            info!("Delivering notices via webhook {}", url);
            Arc::new(WebhookNotifier::new(url.clone(), config.delivery_timeout)?)
        }
        None => {
            info!("Delivering notices via websocket gateway");
            Arc::new(dispatcher.clone())
        }
    };

    // Scheduled scans
    let sla: Arc<dyn ScanJob> = Arc::new(SlaScan::new(
        store.clone(),
        notifier.clone(),
        SlaPolicy {
            sla_hours: config.sla_hours,
            staff: config.staff_ids.clone(),
        },
        config.delivery_timeout,
    ));
    let subscriptions: Arc<dyn ScanJob> = Arc::new(SubscriptionScan::new(
        store.clone(),
        notifier.clone(),
        config.utc_offset,
        config.delivery_timeout,
    ));

    let mut scheduler = Scheduler::new();
    let sla_runner = scheduler.add(Trigger::Every(config.sla_scan_interval), sla);
    let subscription_runner = scheduler.add(
        Trigger::DailyAt {
            time: config.subscription_scan_at,
            offset: config.utc_offset,
        },
        subscriptions,
    );
    let scans = HashMap::from([
        (sla_runner.name(), sla_runner),
        (subscription_runner.name(), subscription_runner),
    ]);
    let scheduler = scheduler.start();

    let app_state: AppState = Arc::new(AppStateInner {
        helpdesk: Helpdesk::new(store, config.staff_ids.clone()),
        notifier,
        delivery_timeout: config.delivery_timeout,
        offset: config.utc_offset,
        scans,
    });

    let mut app = helpdesk_api::router(app_state);
    if config.webhook_url.is_none() {
        let ws_route = Router::new()
            .route("/gateway", get(ws_upgrade))
            .with_state(dispatcher);
        app = app.merge(ws_route);
    }
    let app = app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Helpdesk listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let any in-flight scan finish before exiting
    scheduler.shutdown().await;
    info!("Helpdesk stopped");

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    user_id: UserId,
}

async fn ws_upgrade(
    State(dispatcher): State<Dispatcher>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, query.user_id))
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
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
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
