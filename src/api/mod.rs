pub mod handlers;
pub mod rate_limit;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    BoxError, Router,
};
use sqlx::SqlitePool;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tower::{timeout::error::Elapsed, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::db::{create_pool, init_database_with_pool};
use crate::error::{AppError, Result};
use crate::services::{ChatRelay, NarrativeGenerator, PaymentGateway, SportsGateway};
use rate_limit::IpRateLimiter;

const NO_STORE: &str = "no-store, no-cache, must-revalidate, private";

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub gateway: Arc<SportsGateway>,
    pub narrator: Arc<NarrativeGenerator>,
    pub payments: Arc<PaymentGateway>,
    pub relay: ChatRelay,
    pub rate_limiter: IpRateLimiter,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self> {
        Ok(Self {
            gateway: Arc::new(SportsGateway::new(&config)?),
            narrator: Arc::new(NarrativeGenerator::new(&config)?),
            payments: Arc::new(PaymentGateway::new(&config)?),
            relay: ChatRelay::default(),
            rate_limiter: IpRateLimiter::per_minute(config.rate_limit_per_minute)?,
            config: Arc::new(config),
            pool,
        })
    }
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = create_pool(&config.database_url).await?;
    init_database_with_pool(&pool).await?;

    let port = config.port;
    let state = AppState::new(pool, config)?;

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            limiter.retain_recent();
        }
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Scoutei API server listening on port {}", port);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server closed");
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    let api: Router<AppState> = Router::new()
        .route("/api/fixtures", get(handlers::fixtures))
        .route("/api/statistics", get(handlers::statistics))
        .route("/api/odds/{fixture_id}", get(handlers::odds))
        .route("/api/events", get(handlers::events))
        .route("/api/live/{fixture_id}", get(handlers::live))
        .route("/api/chat", post(handlers::chat))
        .route("/api/insider/{fixture_id}", get(handlers::insider))
        .route("/api/reset-fixtures", get(handlers::reset_fixtures))
        .route("/api/predictions/{fixture_id}", delete(handlers::invalidate_predictions))
        .route("/api/matches", get(handlers::matches))
        .route("/api/matches/{fixture_id}/overview", get(handlers::match_overview))
        .route("/api/matches/{fixture_id}/value", get(handlers::match_value))
        .route("/api/matches/{fixture_id}/narrative", get(handlers::match_narrative))
        .route("/api/mp/preference", post(handlers::create_preference))
        .route("/api/webhooks/mercadopago", post(handlers::mercadopago_webhook))
        .route("/api/pedido-status", get(handlers::order_status))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(NO_STORE),
        ));

    let public = PathBuf::from(&state.config.public_dir);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let cors = cors_layer(state.config.cors_origin.as_deref());
    let limit = middleware::from_fn_with_state(state.clone(), rate_limit::limit_by_ip);

    Router::new()
        .merge(api)
        .route("/health", get(handlers::health))
        .route("/robots.txt", get(handlers::robots))
        .route("/socket", get(handlers::chat_socket))
        .route_service("/gps", ServeFile::new(public.join("index.html")))
        .fallback_service(ServeDir::new(public))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(limit)
                .layer(CompressionLayer::new())
                .layer(HandleErrorLayer::new(timeout_error))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}

async fn timeout_error(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::Timeout
    } else {
        AppError::Internal(err.to_string())
    }
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin else {
        return CorsLayer::permissive();
    };

    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any),
        Err(e) => {
            tracing::warn!("Invalid CORS_ORIGIN {:?} ({}), allowing any origin", origin, e);
            CorsLayer::permissive()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::warn!("Graceful shutdown started");
}
