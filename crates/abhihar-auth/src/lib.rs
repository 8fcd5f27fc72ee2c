//! Authentication primitives for the abhihar API
//!
//! Everything in this crate is pure computation: password hashing, the
//! signed session token, and the glue that turns an `Authorization`
//! header into an authenticated identity.

pub mod password;
pub mod session;
pub mod token;

pub use password::{derive_hash, generate_salt, verify_password, HashedPassword};
pub use session::{bearer_token, normalize_email, AdminBootstrap, Identity, SessionAuthenticator};
pub use token::{
    Claims, IssuedToken, Role, SigningKey, TokenError, TokenPayload, Verification,
    DEFAULT_TTL_SECS, ISSUER,
};

/// Compare two byte strings without short-circuiting on the first difference.
///
/// Length is checked first; a length mismatch returns `false` immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
