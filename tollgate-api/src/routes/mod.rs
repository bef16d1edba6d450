/// API route handlers

pub mod account;
pub mod api_keys;
pub mod audit_logs;
pub mod features;
pub mod health;
pub mod members;
pub mod projects;
