/// Middleware modules for the API server
///
/// - `actor`: resolves the request's actor from an API key or session cookie
/// - `security`: security response headers

pub mod actor;
pub mod security;
