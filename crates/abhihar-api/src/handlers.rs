use abhihar_auth::{
    normalize_email, verify_password, Claims, HashedPassword, Identity, IssuedToken, Role,
};
use abhihar_db::{
    entities::user::{self, UserRole},
    is_unique_violation,
    store::{self, NewOrder},
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::models::*;
use crate::AppState;

/// Health check
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = OkResponse)
    ),
    tag = "system"
)]
pub async fn health_check() -> Json<OkResponse> {
    Json(OkResponse::ok())
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Email or password missing", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AuthResponse>, ApiError> {
    let auth = state.authenticator()?;
    let req: LoginRequest = parse_body(&body);

    let email = normalize_email(req.email.as_deref().unwrap_or_default());
    let password = req.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("Email and password required"));
    }

    if let Some(admin) = state.admin.as_ref().filter(|a| a.matches(&email, &password)) {
        let user = bootstrap_admin(&state, admin.email(), password).await?;
        info!("Admin login: {}", user.email);
        let issued = auth.issue(&claims_for(&user))?;
        return Ok(Json(auth_response(issued)));
    }

    let user = store::find_user_by_email(&state.db, &email)
        .await
        .map_err(ApiError::database("Login failed"))?
        .ok_or_else(|| {
            debug!("Login for unknown email");
            ApiError::InvalidCredentials
        })?;

    let salt = user.password_salt.clone();
    let stored_hash = user.password_hash.clone();
    let password_ok =
        tokio::task::spawn_blocking(move || verify_password(&password, &salt, &stored_hash))
            .await
            .map_err(|_| ApiError::Internal("Login failed"))?;

    if !password_ok {
        debug!("Wrong password for user {}", user.id);
        return Err(ApiError::InvalidCredentials);
    }

    info!("User logged in: {}", user.email);
    let issued = auth.issue(&claims_for(&user))?;
    Ok(Json(auth_response(issued)))
}

/// Create an account
#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let auth = state.authenticator()?;
    let req: SignupRequest = parse_body(&body);

    let email = normalize_email(req.email.as_deref().unwrap_or_default());
    let password = req.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("Email and password required"));
    }
    if password.chars().count() < 6 {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters",
        ));
    }

    let role = match &state.admin {
        Some(admin) if admin.is_admin_email(&email) => UserRole::Admin,
        _ => UserRole::User,
    };

    let hashed = hash_password(password).await?;
    let user = store::insert_user(&state.db, &email, role, &hashed)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                debug!("Signup for existing email");
                ApiError::Conflict
            } else {
                ApiError::database("Sign up failed")(e)
            }
        })?;

    info!("User registered: {} ({})", user.email, user.id);
    let issued = auth.issue(&claims_for(&user))?;
    Ok((StatusCode::CREATED, Json(auth_response(issued))))
}

/// Get the current user from their token
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(Extension(identity): Extension<Identity>) -> Json<MeResponse> {
    Json(MeResponse {
        user: UserView::from(&identity),
    })
}

/// List orders: admins see every order, users see their own
#[utoipa::path(
    get,
    path = "/api/orders",
    responses(
        (status = 200, description = "List of orders", body = OrderList),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<OrderList>, ApiError> {
    let owner = if identity.is_admin() {
        None
    } else {
        Some(user_id(&identity)?)
    };

    let orders = store::list_orders(&state.db, owner)
        .await
        .map_err(ApiError::database("Failed to load orders"))?;

    debug!("Loaded {} orders", orders.len());

    Ok(Json(OrderList {
        orders: orders.into_iter().map(Order::from).collect(),
    }))
}

/// Place an order for the current user
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Invalid order payload", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let req: CreateOrderRequest = parse_body(&body);

    let (Some(items), Some(total)) = (req.items(), req.total()) else {
        return Err(ApiError::BadRequest("Invalid order payload"));
    };

    let items = serde_json::to_string(items)
        .map_err(|_| ApiError::BadRequest("Invalid order payload"))?;

    let created = store::insert_order(
        &state.db,
        NewOrder {
            user_id: user_id(&identity)?,
            email: identity.email.clone(),
            items,
            total,
        },
    )
    .await
    .map_err(ApiError::database("Failed to create order"))?;

    info!("Order {} created by user {}", created.id, created.user_id);

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            order: created.into(),
        }),
    ))
}

/// Delete an order (admin only)
#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    params(
        ("id" = i32, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order deleted, or did not exist", body = OkResponse),
        (status = 400, description = "Invalid order id", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let Some(id) = parse_order_id(&id)? else {
        debug!("Order id {} cannot match any row", id);
        return Ok(Json(OkResponse::ok()));
    };

    let removed = store::delete_order(&state.db, id)
        .await
        .map_err(ApiError::database("Failed to delete order"))?;

    info!("Order {} deleted ({} rows)", id, removed);

    Ok(Json(OkResponse::ok()))
}

/// Fallback for unknown paths and unsupported methods
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Parse a JSON object body regardless of its content type
///
/// Empty bodies, invalid JSON and anything other than an object count as
/// an empty object.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> T {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_else(|e| {
            debug!("Ignoring mistyped request body: {}", e);
            T::default()
        }),
        _ => T::default(),
    }
}

/// Parse an order id path segment
///
/// Any finite number is accepted. Numbers that are not an `i32` integer
/// cannot name a row and yield `None`.
fn parse_order_id(raw: &str) -> Result<Option<i32>, ApiError> {
    let id: f64 = raw
        .trim()
        .parse()
        .ok()
        .filter(|id: &f64| id.is_finite())
        .ok_or(ApiError::BadRequest("Invalid order id"))?;

    let in_range = id.fract() == 0.0 && id >= f64::from(i32::MIN) && id <= f64::from(i32::MAX);
    Ok(in_range.then_some(id as i32))
}

/// Create the bootstrap admin row, or promote the existing one
async fn bootstrap_admin(
    state: &AppState,
    email: &str,
    password: String,
) -> Result<user::Model, ApiError> {
    let promoted = store::promote_existing_admin(&state.db, email)
        .await
        .map_err(ApiError::database("Login failed"))?;
    if let Some(user) = promoted {
        return Ok(user);
    }

    let hashed = hash_password(password).await?;
    store::create_admin(&state.db, email, &hashed)
        .await
        .map_err(ApiError::database("Login failed"))
}

/// Hash on the blocking pool
async fn hash_password(password: String) -> Result<HashedPassword, ApiError> {
    tokio::task::spawn_blocking(move || HashedPassword::new(&password))
        .await
        .map_err(|_| ApiError::Internal("Password hashing failed"))
}

fn claims_for(user: &user::Model) -> Claims {
    Claims {
        uid: i64::from(user.id),
        email: user.email.clone(),
        role: Role::from(user.role),
    }
}

fn auth_response(issued: IssuedToken) -> AuthResponse {
    AuthResponse {
        user: UserView::from(&issued.payload),
        token: issued.token,
    }
}

/// Row id of the caller; tokens carrying an id the store cannot hold are rejected
fn user_id(identity: &Identity) -> Result<i32, ApiError> {
    i32::try_from(identity.uid).map_err(|_| ApiError::Unauthorized)
}
