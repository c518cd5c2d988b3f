//! Turns an email into a structured todo description.
//!
//! A [`Classifier`] makes one call to an external language model. Callers go
//! through [`classify_or_fallback`], which caps the body sent to the model and
//! replaces any failure with [`Classification::fallback`], so classification
//! never fails from the pipeline's point of view.

pub mod openai;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::TaskPriority;

pub use openai::OpenAiClassifier;

/// Maximum number of body characters included in the prompt.
pub const MAX_BODY_CHARS: usize = 1000;

/// Notes attached to the fallback classification.
pub const FALLBACK_NOTES: &str = "AI processing failed, using email subject as task";

/// The structured description extracted from an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub summary: String,
    pub priority: TaskPriority,
    pub deadline: Option<NaiveDate>,
    pub notes: String,
}

impl Classification {
    /// The deterministic substitute used whenever classification fails.
    pub fn fallback(subject: &str) -> Self {
        Self {
            summary: subject.to_string(),
            priority: TaskPriority::Medium,
            deadline: None,
            notes: FALLBACK_NOTES.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier is not configured")]
    Unavailable,
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response contained no message")]
    EmptyResponse,
    #[error("model response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model response is missing a summary")]
    MissingSummary,
    #[error("model response has an invalid priority: {0}")]
    InvalidPriority(String),
}

/// A single-shot call to an external text-to-structure model.
///
/// Implementations must not retry; `body` has already been truncated.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, subject: &str, body: &str) -> Result<Classification, ClassifyError>;
}

/// Stand-in used when no model is configured. Every call fails, so every
/// email gets the fallback todo.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _subject: &str, _body: &str) -> Result<Classification, ClassifyError> {
        Err(ClassifyError::Unavailable)
    }
}

/// Returns the first [`MAX_BODY_CHARS`] characters of `body`.
pub fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((byte_index, _)) => &body[..byte_index],
        None => body,
    }
}

/// Classifies an email, substituting the fallback on any failure.
pub async fn classify_or_fallback(
    classifier: &dyn Classifier,
    subject: &str,
    body: &str,
) -> Classification {
    match classifier.classify(subject, truncate_body(body)).await {
        Ok(classification) => classification,
        Err(e) => {
            log::warn!("Classification failed, using subject as todo: {}", e);
            Classification::fallback(subject)
        }
    }
}

/// Builds the instruction prompt sent to the model.
pub fn build_prompt(subject: &str, body: &str) -> String {
    format!(
        r#"Analyze this email and extract actionable tasks. Return a JSON object with:
{{
  "summary": "Brief summary of the main task",
  "priority": "HIGH/MEDIUM/LOW",
  "deadline": "YYYY-MM-DD if mentioned, otherwise null",
  "notes": "Additional important details"
}}

Email Subject: {}
Email Body: {}"#,
        subject,
        truncate_body(body)
    )
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    summary: Option<String>,
    priority: Option<String>,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Parses the model's textual answer into a [`Classification`].
///
/// A surrounding Markdown code fence is ignored. `summary` and `priority` are
/// required; a deadline that is not a `YYYY-MM-DD` date is dropped.
pub fn parse_classification(content: &str) -> Result<Classification, ClassifyError> {
    let raw: RawClassification = serde_json::from_str(strip_code_fence(content))?;

    let summary = raw
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ClassifyError::MissingSummary)?;

    let priority_text = raw.priority.unwrap_or_default();
    let priority = priority_text
        .parse::<TaskPriority>()
        .map_err(|_| ClassifyError::InvalidPriority(priority_text.clone()))?;

    let deadline = raw.deadline.as_deref().map(str::trim).and_then(|text| {
        if text.is_empty() || text.eq_ignore_ascii_case("null") {
            return None;
        }
        match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                log::warn!("Ignoring unparseable deadline from model: {}", text);
                None
            }
        }
    });

    Ok(Classification {
        summary,
        priority,
        deadline,
        notes: raw.notes.unwrap_or_default(),
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
