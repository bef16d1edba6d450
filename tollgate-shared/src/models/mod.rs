/// Domain models
///
/// Plain data types shared by every storage backend. Persistence lives in
/// [`crate::store`]; these types carry only validation and pure helpers.
///
/// # Models
///
/// - `account`: Tenant root with tier, status and typed settings
/// - `member`: Account membership with role and feature overrides
/// - `project`: Project tree and project-level membership
/// - `api_key`: Scoped, revocable API credentials
/// - `audit`: Append-only audit entries, filters and pagination
/// - `user`: Identities resolved from the external login system

pub mod account;
pub mod api_key;
pub mod audit;
pub mod member;
pub mod project;
pub mod user;
