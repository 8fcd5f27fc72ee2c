//! Bearer Token Authentication Middleware
//!
//! Extracts the token from the `Authorization: Bearer <token>` header,
//! verifies it, and makes the caller's [`Identity`] available to handlers
//! via Axum's `Extension`.
//!
//! [`Identity`]: abhihar_auth::Identity

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::{error::ApiError, AppState};

/// Authentication middleware for protected routes
///
/// # Errors
/// - 500 if the server has no signing secret
/// - 401 if the header is missing, not `Bearer`, or the token does not
///   verify; the reason is never included in the response
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authenticator = state.authenticator()?;

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let identity = authenticator.authenticate(auth_header).ok_or_else(|| {
        debug!("Rejected request to {}", request.uri().path());
        ApiError::Unauthorized
    })?;

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use abhihar_auth::{
        token, Claims, Identity, Role, SessionAuthenticator, SigningKey,
    };
    use axum::{body::Body, http::Request, http::StatusCode, middleware, routing::get, Json, Router};
    use chrono::Duration;
    use sea_orm::DatabaseConnection;
    use tower::ServiceExt; // For oneshot()

    use crate::models::ErrorResponse;

    const SECRET: &[u8] = b"test-secret-key";

    // Test handler that returns the authenticated user
    async fn protected_handler(axum::Extension(user): axum::Extension<Identity>) -> Json<Identity> {
        Json(user)
    }

    fn create_test_app(secret: Option<&[u8]>) -> Router {
        let auth = secret.map(|s| {
            SessionAuthenticator::new(SigningKey::new(s).unwrap(), Duration::hours(1))
        });
        let state = Arc::new(AppState {
            db: DatabaseConnection::Disconnected,
            auth,
            admin: None,
        });

        Router::new()
            .route("/protected", get(protected_handler))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    fn token_for(secret: &[u8], role: Role, ttl: Duration) -> String {
        let claims = Claims {
            uid: 12,
            email: "user@example.com".to_string(),
            role,
        };
        token::issue(&claims, &SigningKey::new(secret).unwrap(), ttl)
            .unwrap()
            .token
    }

    async fn send(app: Router, auth: Option<String>) -> axum::response::Response {
        let mut builder = Request::builder().uri("/protected");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn error_body(response: axum::response::Response) -> ErrorResponse {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let app = create_test_app(Some(SECRET));
        let token = token_for(SECRET, Role::Admin, Duration::hours(1));

        let response = send(app, Some(format!("Bearer {}", token))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let identity: Identity = serde_json::from_slice(&body).unwrap();
        assert_eq!(identity.uid, 12);
        assert_eq!(identity.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let response = send(create_test_app(Some(SECRET)), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_body(response).await.error, "Unauthorized");
    }

    #[tokio::test]
    async fn test_invalid_bearer_format() {
        let token = token_for(SECRET, Role::User, Duration::hours(1));
        let response = send(
            create_test_app(Some(SECRET)),
            Some(format!("Token {}", token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let token = token_for(SECRET, Role::User, Duration::seconds(-10));
        let response = send(
            create_test_app(Some(SECRET)),
            Some(format!("Bearer {}", token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        // Same message as any other failure
        assert_eq!(error_body(response).await.error, "Unauthorized");
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let token = token_for(b"wrong-secret-key", Role::User, Duration::hours(1));
        let response = send(
            create_test_app(Some(SECRET)),
            Some(format!("Bearer {}", token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_secret_not_configured() {
        let token = token_for(SECRET, Role::User, Duration::hours(1));
        let response = send(create_test_app(None), Some(format!("Bearer {}", token))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_body(response).await.error,
            "JWT secret not configured"
        );
    }
}
