/// Error taxonomy for the authorization core
///
/// Every protected operation ends in one of these variants. Role, tier,
/// scope and rate-limit failures are produced only by the [`Gate`](crate::Gate);
/// business logic sees either "allowed, proceed" or maps its own failures to
/// `NotFound`, `Validation` or `Conflict`.
///
/// # Message policy
///
/// - Lookups of accounts and members use generic messages so callers cannot
///   enumerate users.
/// - Role and scope failures name what was required, since that is not secret.
/// - Rate limit failures never carry counts or window timing.

use crate::store::StoreError;

/// Result alias used by the core services
pub type GateResult<T> = Result<T, GateError>;

/// Errors surfaced by the authorization core
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No credentials, or credentials that do not resolve to an actor
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Resource absent or not visible to this tenant (indistinguishable)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated but insufficient role, feature permission or tier
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// API key lacks the scope an operation requires
    #[error("Missing required scope: {0}")]
    InsufficientScope(String),

    /// Quota for an abuse-prone action exhausted
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Request fields that failed validation, as `(field, message)` pairs
    #[error("Validation failed ({} field errors)", .0.len())]
    InvalidFields(Vec<(String, String)>),

    /// Invariant violation (sole owner, circular hierarchy, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure surfaced to the caller
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for GateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => GateError::Conflict(message),
            StoreError::NotFound(message) => GateError::NotFound(message),
            other => GateError::Store(other),
        }
    }
}

impl GateError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Unauthenticated(_) => "unauthorized",
            GateError::NotFound(_) => "not_found",
            GateError::Forbidden(_) => "forbidden",
            GateError::InsufficientScope(_) => "insufficient_scope",
            GateError::RateLimited => "rate_limited",
            GateError::Validation(_) | GateError::InvalidFields(_) => "validation_error",
            GateError::Conflict(_) => "conflict",
            GateError::Store(_) => "internal_error",
        }
    }

    /// Generic error used wherever a member lookup could leak account existence
    pub(crate) fn member_lookup_failed() -> Self {
        GateError::Validation("Unable to add member, verify the email address".to_string())
    }
}
