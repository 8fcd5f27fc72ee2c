//! Credential and order queries used by the API handlers

use abhihar_auth::HashedPassword;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{debug, info};

use crate::entities::{
    order,
    prelude::*,
    user::{self, UserRole},
};
use crate::is_unique_violation;

/// Fields of an order supplied by the caller
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i32,
    pub email: String,
    /// Serialized JSON array
    pub items: String,
    pub total: f64,
}

pub async fn find_user_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<user::Model>, DbErr> {
    User::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
}

/// Insert a credential row
///
/// A second row for the same email fails with a unique violation
/// (see [`is_unique_violation`]).
pub async fn insert_user(
    db: &DatabaseConnection,
    email: &str,
    role: UserRole,
    password: &HashedPassword,
) -> Result<user::Model, DbErr> {
    let user = user::ActiveModel {
        email: Set(email.to_string()),
        role: Set(role),
        password_hash: Set(password.hash.clone()),
        password_salt: Set(password.salt.clone()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    user.insert(db).await
}

/// Set a user's role to admin, leaving everything else unchanged
pub async fn promote_to_admin(
    db: &DatabaseConnection,
    user: user::Model,
) -> Result<user::Model, DbErr> {
    if user.role == UserRole::Admin {
        return Ok(user);
    }

    info!("Promoting user {} to admin", user.id);
    let mut active: user::ActiveModel = user.into();
    active.role = Set(UserRole::Admin);
    active.update(db).await
}

/// Promote the row for `email` to admin, if there is one
pub async fn promote_existing_admin(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<user::Model>, DbErr> {
    match find_user_by_email(db, email).await? {
        Some(existing) => promote_to_admin(db, existing).await.map(Some),
        None => Ok(None),
    }
}

/// Insert the admin row for `email`
///
/// If a concurrent signup inserted the email first, that row is promoted
/// instead.
pub async fn create_admin(
    db: &DatabaseConnection,
    email: &str,
    password: &HashedPassword,
) -> Result<user::Model, DbErr> {
    match insert_user(db, email, UserRole::Admin, password).await {
        Ok(created) => {
            info!("Created admin user {}", created.id);
            Ok(created)
        }
        Err(e) if is_unique_violation(&e) => {
            debug!("Admin row appeared concurrently, promoting instead");
            promote_existing_admin(db, email).await?.ok_or(e)
        }
        Err(e) => Err(e),
    }
}

/// Orders newest first, optionally restricted to one owner
pub async fn list_orders(
    db: &DatabaseConnection,
    owner: Option<i32>,
) -> Result<Vec<order::Model>, DbErr> {
    let mut query = Order::find();
    if let Some(user_id) = owner {
        query = query.filter(order::Column::UserId.eq(user_id));
    }

    query
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(db)
        .await
}

pub async fn insert_order(db: &DatabaseConnection, new: NewOrder) -> Result<order::Model, DbErr> {
    let order = order::ActiveModel {
        user_id: Set(new.user_id),
        email: Set(new.email),
        items: Set(new.items),
        total: Set(new.total),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    order.insert(db).await
}

/// Delete an order by id, returning the number of rows removed
pub async fn delete_order(db: &DatabaseConnection, id: i32) -> Result<u64, DbErr> {
    let result = Order::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected)
}
