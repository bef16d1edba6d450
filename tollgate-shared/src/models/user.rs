/// User identity model
///
/// Identities are owned by the external session/login system; this crate only
/// reads them to resolve invite emails and to seed development data.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     email TEXT NOT NULL UNIQUE,
///     name VARCHAR(255),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Stored lowercase
    pub email: String,

    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Builds a new identity with a normalized email
    pub fn new(email: &str, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name,
            created_at: Utc::now(),
        }
    }
}

/// Trims and lowercases an email address for lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let user = User::new("  Alice@Example.COM ", None);
        assert_eq!(user.email, "alice@example.com");
    }
}
