use abhihar_auth::{Identity, Role, TokenPayload};
use abhihar_db::entities::order;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Generic success response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub password: Option<String>,
}

/// Signup request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SignupRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    /// At least 6 characters
    #[serde(default, deserialize_with = "lenient_string")]
    pub password: Option<String>,
}

/// Accept a string or a number; anything else reads as absent
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// User as seen through their token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub email: String,
    #[schema(value_type = String, example = "user")]
    pub role: Role,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

impl From<&TokenPayload> for UserView {
    fn from(payload: &TokenPayload) -> Self {
        Self {
            email: payload.email.clone(),
            role: payload.role,
            iat: payload.iat,
            exp: payload.exp,
        }
    }
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            email: identity.email.clone(),
            role: identity.role,
            iat: identity.iat,
            exp: identity.exp,
        }
    }
}

/// Response to login and signup
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests
    pub token: String,
    pub user: UserView,
}

/// Response to `GET /api/me`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserView,
}

/// Order as returned to clients, with items parsed back into JSON
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: i32,
    pub user_id: i32,
    pub email: String,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<Value>,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

impl From<order::Model> for Order {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            email: model.email,
            items: parse_items(&model.items),
            total: model.total,
            created_at: model.created_at,
        }
    }
}

/// Parse stored items; anything that is not a JSON array becomes empty
pub fn parse_items(raw: &str) -> Vec<Value> {
    match serde_json::from_str(raw) {
        Ok(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// List of orders
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderList {
    pub orders: Vec<Order>,
}

/// Single order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub order: Order,
}

/// Request to place an order
///
/// Fields are kept as raw JSON so shape errors surface as 400s.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// Must be an array; elements are stored as-is
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub items: Value,
    /// Number, or a string holding a number
    #[serde(default)]
    #[schema(value_type = f64)]
    pub total: Value,
}

impl CreateOrderRequest {
    pub fn items(&self) -> Option<&Vec<Value>> {
        self.items.as_array()
    }

    /// The total as a finite number, if it is one
    pub fn total(&self) -> Option<f64> {
        let total = match &self.total {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;

        total.is_finite().then_some(total)
    }
}
