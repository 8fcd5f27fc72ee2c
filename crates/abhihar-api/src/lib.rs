pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use abhihar_auth::{AdminBootstrap, SessionAuthenticator, SigningKey, DEFAULT_TTL_SECS};
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    pub db: DatabaseConnection,
    /// `None` when the server was started without a signing secret
    pub auth: Option<SessionAuthenticator>,
    pub admin: Option<AdminBootstrap>,
}

impl AppState {
    /// The token authenticator, or a 500 if no secret is configured
    pub fn authenticator(&self) -> Result<&SessionAuthenticator, ApiError> {
        self.auth.as_ref().ok_or(ApiError::SecretNotConfigured)
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Abhihar API",
        version = "0.1.0",
        description = "Authentication and order management API",
    ),
    paths(
        handlers::health_check,
        handlers::login,
        handlers::signup,
        handlers::me,
        handlers::list_orders,
        handlers::create_order,
        handlers::delete_order,
    ),
    components(
        schemas(
            models::OkResponse,
            models::ErrorResponse,
            models::LoginRequest,
            models::SignupRequest,
            models::UserView,
            models::AuthResponse,
            models::MeResponse,
            models::Order,
            models::OrderList,
            models::OrderResponse,
            models::CreateOrderRequest,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Signup, login and the current user"),
        (name = "orders", description = "Order management endpoints"),
        (name = "system", description = "System health endpoints")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// The OpenAPI document as pretty-printed JSON
pub fn openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS for localhost origins (for development)
    pub enable_cors: bool,
    /// HMAC secret for session tokens; empty counts as unset
    pub jwt_secret: Option<String>,
    /// Lifetime of issued tokens
    pub token_ttl: chrono::Duration,
    /// Break-glass administrator credential
    pub admin: Option<AdminBootstrap>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5174)),
            enable_cors: false,
            jwt_secret: None,
            token_ttl: chrono::Duration::seconds(DEFAULT_TTL_SECS),
            admin: None,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, db: DatabaseConnection) -> Self {
        let auth = SigningKey::from_config(config.jwt_secret.as_deref())
            .map(|key| SessionAuthenticator::new(key, config.token_ttl));

        if auth.is_none() {
            warn!("JWT secret not configured; login, signup and orders will answer 500");
        }

        let state = Arc::new(AppState {
            db,
            auth,
            admin: config.admin.clone(),
        });

        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        // PUBLIC routes (no authentication required)
        let public_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/api/login", post(handlers::login))
            .route("/api/signup", post(handlers::signup));

        // PROTECTED routes (require a bearer token)
        let protected_router = Router::new()
            .route("/api/me", get(handlers::me))
            .route(
                "/api/orders",
                get(handlers::list_orders).post(handlers::create_order),
            )
            .route("/api/orders/{id}", delete(handlers::delete_order))
            .route_layer(axum_middleware::from_fn_with_state(
                self.state.clone(),
                middleware::require_auth,
            ));

        let mut router = public_router
            .merge(protected_router)
            .fallback(handlers::not_found)
            .method_not_allowed_fallback(handlers::not_found)
            .with_state(self.state.clone())
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ))
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
                    // Allow common development origins
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                        || origin_str.starts_with("https://localhost:")
                        || origin_str.starts_with("https://127.0.0.1:")
                }));
            router = router.layer(cors);
        }

        router
    }

    /// Start the API server and run until Ctrl+C
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
