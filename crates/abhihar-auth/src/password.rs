//! Password hashing and verification using PBKDF2-HMAC-SHA512
//!
//! Credentials are stored as a hex salt plus a hex-encoded derived key.
//! The KDF consumes the salt in its stored (hex text) form, so a stored
//! `(salt, hash)` pair can be re-derived from the row alone.

use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha512;

use crate::constant_time_eq;

/// PBKDF2 iteration count
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Derived key length in bytes (hex output is twice as long)
pub const HASH_LEN: usize = 64;

/// Random salt length in bytes before hex encoding
pub const SALT_LEN: usize = 16;

/// Salt and derived key for one credential, both hex encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    pub salt: String,
    pub hash: String,
}

impl HashedPassword {
    /// Hash a password under a freshly generated salt
    ///
    /// # Example
    /// ```
    /// use abhihar_auth::password::{verify_password, HashedPassword};
    ///
    /// let hashed = HashedPassword::new("secret1");
    /// assert!(verify_password("secret1", &hashed.salt, &hashed.hash));
    /// assert!(!verify_password("secret2", &hashed.salt, &hashed.hash));
    /// ```
    pub fn new(password: &str) -> Self {
        let salt = generate_salt();
        let hash = derive_hash(password, salt.as_bytes());
        Self { salt, hash }
    }
}

/// Generate a new salt from the OS RNG, hex encoded
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derive the hex-encoded key for `password` under `salt`
///
/// Deterministic for identical inputs.
pub fn derive_hash(password: &str, salt: &[u8]) -> String {
    let mut key = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    hex::encode(key)
}

/// Check `password` against a stored salt and hash
///
/// The freshly derived value is compared with the stored one as a whole.
pub fn verify_password(password: &str, salt: &str, stored_hash: &str) -> bool {
    let computed = derive_hash(password, salt.as_bytes());
    constant_time_eq(computed.as_bytes(), stored_hash.as_bytes())
}
