//! Request authentication and role-based authorization
//!
//! Turns an `Authorization` header into an [`Identity`] by verifying the
//! bearer token, and holds the break-glass administrator gate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constant_time_eq;
use crate::token::{self, Claims, IssuedToken, Role, SigningKey, TokenError, TokenPayload};

/// Authenticated caller, decoded from a valid token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: i64,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Admins may act on any record; users only on their own
    pub fn can_access(&self, owner_id: i64) -> bool {
        self.is_admin() || self.uid == owner_id
    }
}

impl From<TokenPayload> for Identity {
    fn from(payload: TokenPayload) -> Self {
        Self {
            uid: payload.uid,
            email: payload.email,
            role: payload.role,
            iat: payload.iat,
            exp: payload.exp,
        }
    }
}

/// Trim and lowercase an email for storage and comparison
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Extract the token from an `Authorization: Bearer <token>` header value
///
/// The scheme must be exactly `Bearer` followed by a single space.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split(' ');
    if parts.next() != Some("Bearer") {
        return None;
    }

    parts.next().filter(|token| !token.is_empty())
}

/// Issues tokens and authenticates bearer credentials with one secret
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    key: SigningKey,
    ttl: Duration,
}

impl SessionAuthenticator {
    pub fn new(key: SigningKey, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, claims: &Claims) -> Result<IssuedToken, TokenError> {
        token::issue(claims, &self.key, self.ttl)
    }

    /// Authenticate an `Authorization` header value, if any
    pub fn authenticate(&self, header: Option<&str>) -> Option<Identity> {
        self.authenticate_at(header, Utc::now())
    }

    pub fn authenticate_at(&self, header: Option<&str>, now: DateTime<Utc>) -> Option<Identity> {
        let Some(token) = bearer_token(header) else {
            debug!("No bearer token presented");
            return None;
        };

        token::verify_at(token, &self.key, now)
            .into_payload()
            .map(Identity::from)
    }
}

/// Configured administrator credential that always authenticates
///
/// Both the email and the password must match. The email alone only
/// decides the role granted at signup.
#[derive(Clone)]
pub struct AdminBootstrap {
    email: String,
    password: String,
}

impl AdminBootstrap {
    /// Returns `None` unless both values are non-empty
    pub fn new(email: &str, password: &str) -> Option<Self> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return None;
        }

        Some(Self {
            email,
            password: password.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_admin_email(&self, normalized_email: &str) -> bool {
        self.email == normalized_email
    }

    /// The break-glass check: normalized email AND exact password
    pub fn matches(&self, normalized_email: &str, password: &str) -> bool {
        let password_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        self.is_admin_email(normalized_email) && password_ok
    }
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
