//! # Tollgate Shared Library
//!
//! Authorization and credential core shared by the Tollgate API server and
//! maintenance worker.
//!
//! ## Module Organization
//!
//! - `models`: Accounts, members, projects, API keys, audit entries
//! - `features`: Static feature catalog and tier gating
//! - `store`: Storage traits with in-memory and PostgreSQL backends
//! - `auth`: Actors, session tokens, API key primitives, role & tier resolution
//! - `credentials`: API key lifecycle (issue, validate, revoke, regenerate)
//! - `ratelimit`: Fixed-window counters with in-memory and Redis backends
//! - `audit`: Append-only audit log, query and export
//! - `gate`: Authorization façade every protected operation runs through
//! - `error`: Error taxonomy surfaced to callers

pub mod audit;
pub mod auth;
pub mod credentials;
pub mod error;
pub mod features;
pub mod gate;
pub mod models;
pub mod ratelimit;
pub mod store;

pub use error::{GateError, GateResult};
pub use gate::Gate;

/// Current version of the Tollgate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
