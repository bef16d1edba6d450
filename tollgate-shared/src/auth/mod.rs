/// Authentication and authorization primitives
///
/// # Modules
///
/// - [`actor`]: Resolved request principals (user session or API key)
/// - [`session`]: HS256 session token verification
/// - [`api_key`]: API key generation, salted hashing and scope catalog
/// - [`authorization`]: Role & tier resolver and membership rules
///
/// # Security Features
///
/// - **API Keys**: Salted HMAC-SHA256 hashes, constant-time verification
/// - **Scopes**: Closed catalog, exact matching only
/// - **Sessions**: Issuer, expiry and not-before checks with zero leeway

pub mod actor;
pub mod api_key;
pub mod authorization;
pub mod session;
