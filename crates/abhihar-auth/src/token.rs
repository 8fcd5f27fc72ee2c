//! Signed session tokens (HS256, JWT compact form)
//!
//! A token is `<header>.<payload>.<signature>`, each segment URL-safe base64
//! without padding. The signature is HMAC-SHA256 over the first two encoded
//! segments joined by `.`. Tokens are self-contained: validity is recomputed
//! from the token and the server secret on every request.

use std::fmt;

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD},
        DecodePaddingMode,
    },
    Engine as _,
};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Issuer stamped into every payload
pub const ISSUER: &str = "abhihar-auth";

/// Token lifetime when none is configured (7 days)
pub const DEFAULT_TTL_SECS: i64 = 7 * 24 * 60 * 60;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

/// Decoder that accepts segments with or without trailing `=`
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Token errors
///
/// Only issuance and raw segment decoding report errors. Verification
/// collapses every failure into [`Verification::Invalid`].
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Signing secret is not configured")]
    MissingSecret,

    #[error("Malformed token segment")]
    MalformedSegment,

    #[error("Failed to encode token: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Role carried in the token and in the credential record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity claims supplied by the caller at issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub uid: i64,
    /// Normalized email
    pub email: String,
    pub role: Role,
}

/// Decoded token payload: the claims plus timing and issuer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub uid: i64,
    pub email: String,
    pub role: Role,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds, exclusive)
    pub exp: i64,
    pub iss: String,
}

impl TokenPayload {
    pub fn claims(&self) -> Claims {
        Claims {
            uid: self.uid,
            email: self.email.clone(),
            role: self.role,
        }
    }

    /// True once `now` has reached the expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl Default for TokenHeader {
    fn default() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        }
    }
}

/// A freshly issued token together with the payload it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub payload: TokenPayload,
}

/// Outcome of verifying a presented token
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Verification {
    Valid(TokenPayload),
    Invalid,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    pub fn into_payload(self) -> Option<TokenPayload> {
        match self {
            Verification::Valid(payload) => Some(payload),
            Verification::Invalid => None,
        }
    }
}

/// Server-held HMAC secret
///
/// Cannot be constructed from an empty secret, so a server without a
/// secret has no way to issue or verify tokens.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::MissingSecret)?;
        Ok(Self { mac })
    }

    /// Build a key from optional configuration, treating empty as unset
    pub fn from_config(secret: Option<&str>) -> Option<Self> {
        secret.and_then(|s| Self::new(s).ok())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// URL-safe base64 without padding
pub fn encode(segment: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(segment)
}

/// Inverse of [`encode`]; padded input is accepted too
pub fn decode(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_LENIENT
        .decode(segment)
        .map_err(|_| TokenError::MalformedSegment)
}

/// HMAC-SHA256 of `message` under `key`, URL-safe encoded
pub fn sign(message: &str, key: &SigningKey) -> String {
    let mut mac = key.mac.clone();
    mac.update(message.as_bytes());
    encode(mac.finalize().into_bytes())
}

/// Issue a token valid for `ttl` from now
pub fn issue(claims: &Claims, key: &SigningKey, ttl: Duration) -> Result<IssuedToken, TokenError> {
    issue_at(claims, key, ttl, Utc::now())
}

/// Issue a token as if the current time were `now`
pub fn issue_at(
    claims: &Claims,
    key: &SigningKey,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<IssuedToken, TokenError> {
    let iat = now.timestamp();
    let payload = TokenPayload {
        uid: claims.uid,
        email: claims.email.clone(),
        role: claims.role,
        iat,
        exp: iat + ttl.num_seconds(),
        iss: ISSUER.to_string(),
    };

    let header_enc = encode(serde_json::to_vec(&TokenHeader::default())?);
    let payload_enc = encode(serde_json::to_vec(&payload)?);
    let signing_input = format!("{}.{}", header_enc, payload_enc);
    let signature = sign(&signing_input, key);

    Ok(IssuedToken {
        token: format!("{}.{}", signing_input, signature),
        payload,
    })
}

/// Verify a token against the current time
pub fn verify(token: &str, key: &SigningKey) -> Verification {
    verify_at(token, key, Utc::now())
}

/// Verify a token as if the current time were `now`
pub fn verify_at(token: &str, key: &SigningKey, now: DateTime<Utc>) -> Verification {
    match check(token, key, now) {
        Some(payload) => Verification::Valid(payload),
        None => Verification::Invalid,
    }
}

fn check(token: &str, key: &SigningKey, now: DateTime<Utc>) -> Option<TokenPayload> {
    let mut parts = token.split('.');
    let (Some(header_enc), Some(payload_enc), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        debug!("Token rejected: wrong segment count");
        return None;
    };

    // Canonical encodings are compared, so length is checked before content
    let expected = sign(&format!("{}.{}", header_enc, payload_enc), key);
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        debug!("Token rejected: signature mismatch");
        return None;
    }

    let header: TokenHeader = serde_json::from_slice(&decode(header_enc).ok()?).ok()?;
    if header.alg != ALGORITHM {
        debug!("Token rejected: unsupported algorithm");
        return None;
    }

    let payload: TokenPayload = serde_json::from_slice(&decode(payload_enc).ok()?).ok()?;
    if payload.is_expired_at(now) {
        debug!("Token rejected: expired");
        return None;
    }

    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &[u8] = b"test_secret_key_1234567890";

    fn key() -> SigningKey {
        SigningKey::new(TEST_SECRET).unwrap()
    }

    fn claims() -> Claims {
        Claims {
            uid: 42,
            email: "a@b.com".to_string(),
            role: Role::User,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_encode_strips_padding_and_swaps_alphabet() {
        assert_eq!(encode(b"f"), "Zg");
        assert_eq!(encode(b"fo"), "Zm8");
        assert_eq!(encode(b"foo"), "Zm9v");
        assert_eq!(encode([0xfb, 0xff]), "-_8");
    }

    #[test]
    fn test_decode_round_trip_all_padding_lengths() {
        for len in 0..8usize {
            let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37) ^ 0xfa).collect();
            assert_eq!(decode(&encode(&data)).unwrap(), data);
        }
    }

    #[test]
    fn test_decode_accepts_padded_input() {
        assert_eq!(decode("Zg==").unwrap(), b"f");
        assert_eq!(decode("Zg").unwrap(), b"f");
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not base64!"), Err(TokenError::MalformedSegment)));
        assert!(matches!(decode("a"), Err(TokenError::MalformedSegment)));
    }

    #[test]
    fn test_empty_secret_refused() {
        assert!(matches!(SigningKey::new(""), Err(TokenError::MissingSecret)));
        assert!(SigningKey::from_config(Some("")).is_none());
        assert!(SigningKey::from_config(None).is_none());
        assert!(SigningKey::from_config(Some("s3cret")).is_some());
    }

    #[test]
    fn test_issue_shape() {
        let issued = issue_at(&claims(), &key(), Duration::hours(1), at(1_000)).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: serde_json::Value = serde_json::from_slice(&decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");

        let payload: serde_json::Value =
            serde_json::from_slice(&decode(parts[1]).unwrap()).unwrap();
        assert_eq!(payload["uid"], 42);
        assert_eq!(payload["email"], "a@b.com");
        assert_eq!(payload["role"], "user");
        assert_eq!(payload["iat"], 1_000);
        assert_eq!(payload["exp"], 4_600);
        assert_eq!(payload["iss"], ISSUER);

        assert_eq!(parts[2], sign(&format!("{}.{}", parts[0], parts[1]), &key()));
        assert_eq!(issued.payload.exp, 4_600);
    }

    #[test]
    fn test_verify_valid() {
        let issued = issue(&claims(), &key(), Duration::seconds(DEFAULT_TTL_SECS)).unwrap();
        match verify(&issued.token, &key()) {
            Verification::Valid(payload) => {
                assert_eq!(payload, issued.payload);
                assert_eq!(payload.claims(), claims());
            }
            Verification::Invalid => panic!("fresh token should verify"),
        }
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let t0 = 1_700_000_000;
        let ttl = 3_600;
        let issued = issue_at(&claims(), &key(), Duration::seconds(ttl), at(t0)).unwrap();

        assert!(verify_at(&issued.token, &key(), at(t0)).is_valid());
        assert!(verify_at(&issued.token, &key(), at(t0 + ttl - 1)).is_valid());
        assert!(!verify_at(&issued.token, &key(), at(t0 + ttl)).is_valid());
        assert!(!verify_at(&issued.token, &key(), at(t0 + ttl + 1)).is_valid());
    }

    #[test]
    fn test_expired_token() {
        let issued = issue(&claims(), &key(), Duration::seconds(-10)).unwrap();
        assert_eq!(verify(&issued.token, &key()), Verification::Invalid);
    }

    #[test]
    fn test_wrong_secret() {
        let issued = issue(&claims(), &key(), Duration::hours(1)).unwrap();
        let other = SigningKey::new(b"wrong-secret-key").unwrap();
        assert_eq!(verify(&issued.token, &other), Verification::Invalid);
    }

    #[test]
    fn test_tampered_payload_any_character() {
        let issued = issue(&claims(), &key(), Duration::hours(1)).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();
        let payload = parts[1];

        for i in 0..payload.len() {
            let mut bytes = payload.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered_payload = String::from_utf8(bytes).unwrap();
            let tampered = format!("{}.{}.{}", parts[0], tampered_payload, parts[2]);
            assert!(
                !verify(&tampered, &key()).is_valid(),
                "tampering at index {} was accepted",
                i
            );
        }
    }

    #[test]
    fn test_forged_role_rejected() {
        let issued = issue(&claims(), &key(), Duration::hours(1)).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();
        let forged = TokenPayload {
            role: Role::Admin,
            ..issued.payload.clone()
        };
        let forged_enc = encode(serde_json::to_vec(&forged).unwrap());
        let token = format!("{}.{}.{}", parts[0], forged_enc, parts[2]);
        assert_eq!(verify(&token, &key()), Verification::Invalid);
    }

    #[test]
    fn test_wrong_segment_count() {
        let issued = issue(&claims(), &key(), Duration::hours(1)).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();

        assert!(!verify("", &key()).is_valid());
        assert!(!verify(&format!("{}.{}", parts[0], parts[1]), &key()).is_valid());
        assert!(!verify(&format!("{}.x", issued.token), &key()).is_valid());
    }

    #[test]
    fn test_truncated_or_padded_signature() {
        let issued = issue(&claims(), &key(), Duration::hours(1)).unwrap();
        let truncated = &issued.token[..issued.token.len() - 1];
        assert!(!verify(truncated, &key()).is_valid());
        assert!(!verify(&format!("{}=", issued.token), &key()).is_valid());
    }

    #[test]
    fn test_signed_garbage_payload_is_invalid() {
        let header = encode(br#"{"alg":"HS256","typ":"JWT"}"#);

        // Not base64
        let input = format!("{}.{}", header, "!!!");
        let token = format!("{}.{}", input, sign(&input, &key()));
        assert!(!verify(&token, &key()).is_valid());

        // Not JSON
        let input = format!("{}.{}", header, encode(b"not json"));
        let token = format!("{}.{}", input, sign(&input, &key()));
        assert!(!verify(&token, &key()).is_valid());

        // No expiry
        let input = format!(
            "{}.{}",
            header,
            encode(br#"{"uid":1,"email":"a@b.com","role":"user","iat":0,"iss":"abhihar-auth"}"#)
        );
        let token = format!("{}.{}", input, sign(&input, &key()));
        assert!(!verify(&token, &key()).is_valid());
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let header = encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = encode(
            serde_json::to_vec(&TokenPayload {
                uid: 1,
                email: "a@b.com".to_string(),
                role: Role::Admin,
                iat: 0,
                exp: i64::MAX,
                iss: ISSUER.to_string(),
            })
            .unwrap(),
        );
        let input = format!("{}.{}", header, payload);
        let token = format!("{}.{}", input, sign(&input, &key()));
        assert!(!verify(&token, &key()).is_valid());
    }

    #[test]
    fn test_signing_key_debug_is_redacted() {
        let debug = format!("{:?}", key());
        assert!(!debug.contains("test_secret"));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::User.to_string(), "user");
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }
}
