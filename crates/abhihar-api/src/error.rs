//! API error type and its JSON rendering

use abhihar_auth::TokenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Every failure a handler can answer with
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request fields
    #[error("{0}")]
    BadRequest(&'static str),

    /// Login with an unknown email or a wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed, forged or expired bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated but not allowed to perform the action
    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Email already registered")]
    Conflict,

    /// The server was started without a signing secret
    #[error("JWT secret not configured")]
    SecretNotConfigured,

    /// Store failure; only `context` is shown to the client
    #[error("{context}")]
    Database {
        context: &'static str,
        #[source]
        source: DbErr,
    },

    #[error("Failed to issue token")]
    Token(#[from] TokenError),

    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    /// Wrap a store error with the message the client should see
    pub fn database(context: &'static str) -> impl FnOnce(DbErr) -> Self {
        move |source| Self::Database { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::SecretNotConfigured
            | Self::Database { .. }
            | Self::Token(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "EMAIL_EXISTS",
            Self::SecretNotConfigured => "SECRET_NOT_CONFIGURED",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Token(_) | Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Database { context, source } => {
                tracing::error!(error = %source, "{}", context);
            }
            Self::Token(e) => tracing::error!(error = %e, "Token issuance failed"),
            Self::Internal(message) => tracing::error!("{}", message),
            _ => {}
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::SecretNotConfigured.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Internal("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_database_error_hides_detail() {
        let err = ApiError::database("Failed to load orders")(DbErr::Custom(
            "relation \"orders\" does not exist".to_string(),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "Failed to load orders");
        assert!(!String::from_utf8_lossy(&body).contains("relation"));
    }
}
