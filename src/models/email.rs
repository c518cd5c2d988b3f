use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A received email. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Email {
    pub id: i32,
    pub user_id: i32,
    pub from_email: String,
    pub subject: String,
    /// Plain-text body, stored in full.
    pub body: String,
    pub html_body: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Metadata of a stored attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: i32,
    pub email_id: i32,
    /// Filename as sent by the provider.
    pub filename: String,
    /// Blob storage key. Never exposed to clients.
    #[serde(skip_serializing, default)]
    pub filepath: String,
    pub mimetype: String,
}

/// An email together with its attachments, as returned by `GET /api/emails/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDetail {
    #[serde(flatten)]
    pub email: Email,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct NewEmail {
    pub user_id: i32,
    pub from_email: String,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub filename: String,
    pub filepath: String,
    pub mimetype: String,
}
