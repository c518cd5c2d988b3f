use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An account as stored in the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    /// The account's forwarding alias. Unique, never reassigned.
    pub forward_email: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of an account returned by `GET /api/user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: i32,
    pub email: String,
    pub forward_email: String,
}

impl From<&Account> for AccountProfile {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            forward_email: account.forward_email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub forward_email: String,
}

/// Generates a fresh forwarding alias of the form `todo-xxxxxxxx@domain`.
pub fn generate_forward_email(domain: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("todo-{}@{}", &token[..8], domain)
}

/// Normalizes an inbound destination address for alias lookup.
///
/// Providers may send `Name <addr>`; only the address is kept. Aliases are
/// compared lowercase.
pub fn normalize_alias(raw: &str) -> String {
    let trimmed = raw.trim();
    let address = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
        _ => trimmed,
    };
    address.trim().to_ascii_lowercase()
}
