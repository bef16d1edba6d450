/// Session token verification
///
/// The login flow is owned by an external identity service; it hands the
/// browser an HS256 JWT in the `session` cookie. This module verifies those
/// tokens (and mints them for development and tests) so a request can be
/// resolved to a user acting inside one account.
///
/// # Claims
///
/// - `sub`: user id
/// - `account_id`: account the session is scoped to
/// - `iss`: always `"tollgate"`
/// - `iat` / `nbf` / `exp`: standard timing claims
///
/// # Example
///
/// ```
/// use tollgate_shared::auth::session::{create_session_token, validate_session_token, SessionClaims};
/// use uuid::Uuid;
///
/// let secret = "a-very-long-secret-key-at-least-32-bytes!";
/// let claims = SessionClaims::new(Uuid::new_v4(), Uuid::new_v4());
/// let token = create_session_token(&claims, secret).unwrap();
///
/// let decoded = validate_session_token(&token, secret).unwrap();
/// assert_eq!(decoded.sub, claims.sub);
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ISSUER: &str = "tollgate";

/// Session lifetime when none is given
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Session token errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to create token: {0}")]
    Create(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid session token: {0}")]
    Invalid(String),
}

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub account_id: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
}

impl SessionClaims {
    pub fn new(user_id: Uuid, account_id: Uuid) -> Self {
        Self::with_expiration(user_id, account_id, Duration::hours(DEFAULT_SESSION_TTL_HOURS))
    }

    pub fn with_expiration(user_id: Uuid, account_id: Uuid, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            account_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
        }
    }
}

/// Signs claims with HS256
pub fn create_session_token(claims: &SessionClaims, secret: &str) -> Result<String, SessionError> {
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| SessionError::Create(e.to_string()))
}

/// Verifies signature, issuer, `exp` and `nbf`
pub fn validate_session_token(token: &str, secret: &str) -> Result<SessionClaims, SessionError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => SessionError::Invalid(e.to_string()),
        })
}
