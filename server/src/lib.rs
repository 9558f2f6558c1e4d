//! StoreScore HTTP API.
//!
//! Serves the dashboard: accounts, stores, analysis runs, credits, billing,
//! and the store assistant. All state lives under the data directory.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{signal, SignalKind},
    },
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use config::Config;
use routes::{account, analyses, billing as billing_routes, chat, credits, settings, stores};
use state::AppState;

fn cors(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));
    match HeaderValue::from_str(&config.public_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("STORESCORE_PUBLIC_URL is not a valid origin ({e}), cross-origin requests will fail");
            layer
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/auth/register", post(account::register))
        .route("/api/auth/login", post(account::login))
        .route("/api/me", get(account::me))
        .route("/api/stores", get(stores::list).post(stores::create))
        .route(
            "/api/stores/{id}",
            get(stores::get).patch(stores::update).delete(stores::delete),
        )
        .route(
            "/api/stores/{id}/analyses",
            get(analyses::list).post(analyses::run),
        )
        .route(
            "/api/analyses/{id}",
            get(analyses::get).delete(analyses::delete),
        )
        .route("/api/credits", get(credits::ledger))
        .route("/api/billing", get(billing_routes::overview))
        .route("/api/billing/trial", post(billing_routes::start_trial))
        .route("/api/billing/checkout", post(billing_routes::checkout))
        .route("/api/billing/webhook", post(billing_routes::webhook))
        .route("/api/chat", post(chat::send))
        .route("/api/chat/sessions", get(chat::list_sessions))
        .route(
            "/api/chat/sessions/{id}",
            get(chat::get_session).delete(chat::delete_session),
        )
        .route("/api/settings/ai", get(settings::get_ai).put(settings::put_ai))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors(&state.config)),
        )
        .with_state(state)
}

pub async fn start_server() -> Result<(), String> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading configuration...");
    let config = Config::load().map_err(|e| e.to_string())?;

    info!("Initializing state...");
    let state = AppState::from_config(config)?;

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| format!("bind {address}: {e}"))?;
    info!("Server running on {address}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| e.to_string())?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
