/// API key credential primitives
///
/// Generation, hashing and parsing of API key credentials. Persistence and
/// lifecycle live in [`crate::credentials`].
///
/// # Format
///
/// A credential is presented as `key_id:secret`:
/// - `key_id`: `tg_` + 24 base62 chars, public, stored in clear for lookup
/// - `secret`: 48 base62 chars, shown once at creation
///
/// # Storage
///
/// `secret_hash = hex(salt) + "$" + hex(HMAC-SHA256(key = salt, msg = secret))`
/// with a fresh 16-byte salt per key. Verification recomputes the MAC and
/// compares it with [`Mac::verify_slice`], which runs in constant time.
///
/// # Example
///
/// ```
/// use tollgate_shared::auth::api_key::{generate_key_id, generate_secret, hash_secret, verify_secret};
///
/// let key_id = generate_key_id();
/// let secret = generate_secret();
/// let hash = hash_secret(&secret);
///
/// assert!(key_id.starts_with("tg_"));
/// assert!(verify_secret(&secret, &hash));
/// assert!(!verify_secret("wrong", &hash));
/// ```

use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix identifying Tollgate key ids
pub const KEY_ID_PREFIX: &str = "tg_";

const KEY_ID_RANDOM_LENGTH: usize = 24;

const SECRET_LENGTH: usize = 48;

const SALT_LENGTH: usize = 16;

/// Version of [`SCOPE_CATALOG`]
pub const SCOPE_CATALOG_VERSION: u32 = 1;

/// Closed set of scopes an API key may carry
pub const SCOPE_CATALOG: &[&str] = &[
    "links:read",
    "links:write",
    "contacts:read",
    "contacts:write",
    "popups:read",
    "popups:write",
    "webhooks:read",
    "webhooks:write",
    "utm:read",
    "utm:write",
    "visitors:read",
    "projects:read",
    "projects:write",
    "members:read",
    "audit:read",
];

fn random_base62(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generates a new public key id
pub fn generate_key_id() -> String {
    format!("{}{}", KEY_ID_PREFIX, random_base62(KEY_ID_RANDOM_LENGTH))
}

/// Generates a new secret (~285 bits of entropy)
pub fn generate_secret() -> String {
    random_base62(SECRET_LENGTH)
}

fn mac_for(salt: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(salt).expect("HMAC can take key of any size")
}

/// Hashes a secret with a fresh random salt
pub fn hash_secret(secret: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut mac = mac_for(&salt);
    mac.update(secret.as_bytes());
    let digest = mac.finalize().into_bytes();

    format!("{}${}", hex::encode(salt), hex::encode(digest))
}

/// Verifies a presented secret against a stored hash in constant time
///
/// Malformed stored hashes never verify.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored_hash.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };

    let mut mac = mac_for(&salt);
    mac.update(secret.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Splits `key_id:secret`; `None` unless both halves are non-empty
pub fn parse_credential(presented: &str) -> Option<(&str, &str)> {
    let (key_id, secret) = presented.split_once(':')?;
    if key_id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((key_id, secret))
}

/// Cheap shape check before hitting storage
pub fn is_valid_key_id(key_id: &str) -> bool {
    key_id
        .strip_prefix(KEY_ID_PREFIX)
        .map(|rest| rest.len() == KEY_ID_RANDOM_LENGTH && rest.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(false)
}

/// Whether `scope` is in the catalog
pub fn is_known_scope(scope: &str) -> bool {
    SCOPE_CATALOG.contains(&scope)
}

/// Returns the first scope not in the catalog, if any
pub fn find_unknown_scope<'a>(scopes: &'a [String]) -> Option<&'a str> {
    scopes
        .iter()
        .map(String::as_str)
        .find(|scope| !is_known_scope(scope))
}

/// Exact scope membership; no hierarchy, no wildcard
pub fn has_scope(scopes: &[String], required: &str) -> bool {
    scopes.iter().any(|scope| scope == required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_format() {
        let a = generate_key_id();
        let b = generate_key_id();

        assert!(a.starts_with(KEY_ID_PREFIX));
        assert_eq!(a.len(), KEY_ID_PREFIX.len() + 24);
        assert!(is_valid_key_id(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_secret_format() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 48);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_hash_is_salted() {
        let secret = generate_secret();
        let h1 = hash_secret(&secret);
        let h2 = hash_secret(&secret);

        assert_ne!(h1, h2);
        assert!(verify_secret(&secret, &h1));
        assert!(verify_secret(&secret, &h2));
        assert!(!h1.contains(&secret));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_secret("abc", ""));
        assert!(!verify_secret("abc", "nodollar"));
        assert!(!verify_secret("abc", "zz$zz"));
        assert!(!verify_secret("abc", "00$"));
    }

    #[test]
    fn test_parse_credential() {
        assert_eq!(parse_credential("tg_abc:secret"), Some(("tg_abc", "secret")));
        assert_eq!(parse_credential("tg_abc"), None);
        assert_eq!(parse_credential(":secret"), None);
        assert_eq!(parse_credential("tg_abc:"), None);
    }

    #[test]
    fn test_scope_exactness() {
        for scope in SCOPE_CATALOG {
            let granted = vec![scope.to_string()];
            assert!(has_scope(&granted, scope));

            for other in SCOPE_CATALOG.iter().filter(|s| *s != scope) {
                assert!(!has_scope(&granted, other), "{scope} must not imply {other}");
            }
        }
    }

    #[test]
    fn test_unknown_scope_detection() {
        let scopes = vec!["links:read".to_string(), "links:*".to_string()];
        assert_eq!(find_unknown_scope(&scopes), Some("links:*"));

        let scopes = vec!["links:read".to_string(), "audit:read".to_string()];
        assert_eq!(find_unknown_scope(&scopes), None);
    }
}
