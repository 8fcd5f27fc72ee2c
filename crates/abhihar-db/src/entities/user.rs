//! Credential record: one row per normalized email

use abhihar_auth::Role;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User role in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum UserRole {
    /// May read and delete every order
    #[sea_orm(string_value = "admin")]
    Admin,

    /// Regular user
    #[sea_orm(string_value = "user")]
    User,
}

impl From<UserRole> for Role {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Admin => Role::Admin,
            UserRole::User => Role::User,
        }
    }
}

impl From<Role> for UserRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => UserRole::Admin,
            Role::User => UserRole::User,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Normalized (trimmed, lowercase) email, unique
    #[sea_orm(unique)]
    pub email: String,

    pub role: UserRole,

    /// Hex PBKDF2-SHA512 derived key
    pub password_hash: String,

    /// Hex salt the hash was derived with
    pub password_salt: String,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
