//! # Call Audio Bridge - Main Application Entry Point
//!
//! A real-time telephony audio bridge. The telephony network calls `/voice`
//! when a call arrives, is told to open a media stream to `/media-stream`, and
//! then exchanges μ-law audio with this service over that WebSocket for the
//! rest of the call.
//!
//! ## Application Architecture:
//! - **config**: Configuration (TOML file + environment variables)
//! - **state**: Shared configuration and metrics
//! - **audio**: μ-law codec, tone synthesis, per-call state machine
//! - **protocol**: JSON frames of the media stream
//! - **websocket**: One actor per call, driving the state machine
//! - **handlers**: The inbound call webhook
//! - **health**: Liveness and metrics endpoints
//! - **middleware**: Request logging and metrics
//! - **error**: HTTP and session error types

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod protocol;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Start the server and run until a shutdown signal arrives.
///
/// ## Startup Steps:
/// 1. Load `.env` (if present) and set up logging
/// 2. Load and validate configuration; invalid configuration aborts startup
/// 3. Bind the HTTP server and serve until SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting call-audio-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        stream_url = %config.telephony.stream_url,
        "Configuration loaded"
    );

    let app_state = web::Data::new(AppState::new(config.clone()));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            // Graceful: open calls finish their current frame before the workers exit
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Register every route. Shared by `main` and the HTTP tests.
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health::plain_ok))
        .route("/health", web::get().to(health::plain_ok))
        .route("/voice", web::get().to(handlers::incoming_call))
        .route("/voice", web::post().to(handlers::incoming_call))
        .route("/media-stream", web::get().to(websocket::media_stream))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics)),
        );
}

/// Initialize tracing.
///
/// `RUST_LOG` controls the filter; the default keeps this crate at debug and
/// actix at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_audio_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolve when SIGINT (Ctrl+C) or, on Unix, SIGTERM arrives.
///
/// If a handler cannot be installed the failure is logged and that signal is
/// simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
