//! # Tollgate API Server Library
//!
//! HTTP surface of the authorization core: actor resolution, account and
//! member management, projects, API keys and the audit log.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Actor resolution and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
