pub mod config;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::AppConfig;
use middleware::{admin::admin_middleware, auth::auth_middleware, metrics_handler, metrics_middleware, request_id_middleware, security_headers_middleware};

/// Builds the CORS layer from `AppConfig::cors_origins` rather than
/// reflecting any origin: an invalid entry is dropped with a warning, not
/// treated as a wildcard.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%origin, %err, "skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}

/// Assembles the gateway's router from `AppConfig`. Three route groups,
/// layered in increasing trust:
///
/// - public: `/v1/models`, `/signup`, `/login`, `/refresh`, `/healthz` - no
///   credential required.
/// - authenticated: everything that needs a verified agent identity - the
///   chat-completion gateway itself, account/ledger reads, transfers,
///   conversions.
/// - admin: `/deposit`, gated on the constant-time `X-Admin-Key` check
///   instead of a bearer token.
pub fn create_app(config: AppConfig) -> Router {
    let cors = cors_layer(&config);

    let public_routes = Router::new()
        .route("/v1/models", get(handlers::chat::list_models))
        .route("/signup", post(handlers::auth::signup))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/healthz", get(handlers::health::healthz));

    let authenticated_routes = Router::new()
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .route("/getAccount", get(handlers::account::get_account))
        .route("/getTransactions", get(handlers::account::get_transactions))
        .route("/transfer", post(handlers::transfer::transfer))
        .route("/convert", post(handlers::convert::convert))
        .layer(axum_middleware::from_fn_with_state(config.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/deposit", post(handlers::admin::deposit))
        .layer(axum_middleware::from_fn_with_state(config.clone(), admin_middleware));

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(admin_routes)
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(metrics_middleware))
                .layer(axum_middleware::from_fn(request_id_middleware))
                .layer(axum_middleware::from_fn(security_headers_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(config)
}
