//! notekeeper is a self-hosted note taking service with versioned contents,
//! tags and search.

#[forbid(unsafe_code)]
#[deny(missing_docs, unused_mut)]
mod crypto;
mod database;
pub mod error;
mod note;
mod router;
mod setting;
pub mod telemetry;
mod token;
mod user;

pub mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use database::Database;
use database::migration::Migrator;
use error::ServerError;
use setting::SettingRepository;
use token::TokenGuard;
use user::UserBuilder;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    authorization: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::{ConnectInfo, Request};
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: Database,
    pub crypto: Arc<crypto::PasswordManager>,
    pub routes: Arc<router::table::RouteTable>,
    /// Held while tokens are refreshed or swept.
    pub tokens: TokenGuard,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // every path goes through the route table.
        .fallback(router::dispatch)
        .layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            telemetry::track,
        ))
        .layer(middleware)
        .with_state(state)
}

/// Initialize the application state.
///
/// Migrations run here, before anything can be served.
pub async fn initialize_state(
    config_path: Option<PathBuf>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let config = config::Configuration::default()
        .path(config_path.unwrap_or_default())
        .read();

    let db =
        Database::new(&config.database.path, config.database.pool_size).await?;
    Migrator::embedded().run(&db).await?;

    let crypto = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);
    let routes = Arc::new(router::routes()?);

    let metrics = if config.metrics {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    Ok(AppState {
        config,
        db,
        crypto,
        routes,
        tokens: TokenGuard::default(),
        metrics,
    })
}

/// Bind the configured address and serve until Ctrl+C.
pub async fn serve(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let address = SettingRepository::new(state.db.clone())
        .listen_address()
        .await?;
    let listener = tokio::net::TcpListener::bind(&address).await?;

    token::spawn_cleanup(
        state.db.clone(),
        Arc::clone(&state.tokens),
        state.config.token_cleanup_interval(),
    );

    tracing::info!(%address, "server listening");
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "unable to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

/// Create an account from the command line.
pub async fn add_user(
    state: &AppState,
    username: &str,
    password: &str,
    email: Option<String>,
    admin: bool,
) -> Result<String, ServerError> {
    let user = UserBuilder::new()
        .username(username)
        .password(password)
        .email(email)
        .admin(admin)
        .build(state.db.clone(), Arc::clone(&state.crypto))
        .create_user()
        .await?;

    Ok(user.data.id)
}
