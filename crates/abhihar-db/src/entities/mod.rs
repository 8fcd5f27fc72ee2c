//! Database entities

pub mod order;
pub mod user;

pub use order::Entity as Order;
pub use user::Entity as User;

pub mod prelude {
    pub use super::order::Entity as Order;
    pub use super::user::Entity as User;
}
