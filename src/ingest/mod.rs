//! The email-to-todo pipeline.
//!
//! [`Ingestor::receive`] runs inside the webhook request: it resolves the
//! alias, stores the attachment bytes and persists the email together with
//! its ingest job. Everything after that happens in [`Ingestor::drain`],
//! driven by the [`worker`], and is never reported to the webhook caller.

pub mod worker;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

use crate::blob::BlobStore;
use crate::classifier::{classify_or_fallback, Classification, Classifier};
use crate::config::WorkerSettings;
use crate::models::{normalize_alias, NewAttachment, NewEmail, NewTask, Task};
use crate::store::{AccountStore, IngestJob, JobQueue, MailStore, StoreError};

/// Jobs claimed per round trip to the queue.
const CLAIM_BATCH: i64 = 16;

/// Title used when an email has neither a usable summary nor a subject.
pub const UNTITLED: &str = "(no subject)";

/// An email as delivered by the inbound provider.
#[derive(Debug, Clone, Default)]
pub struct InboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<InboundPart>,
}

/// One uploaded file of an inbound email.
#[derive(Debug, Clone)]
pub struct InboundPart {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no account owns alias `{0}`")]
    UnknownAlias(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// What the webhook learns about an accepted email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub email_id: i32,
    pub owner: i32,
}

pub struct Ingestor {
    accounts: Arc<dyn AccountStore>,
    mail: Arc<dyn MailStore>,
    jobs: Arc<dyn JobQueue>,
    blobs: Arc<dyn BlobStore>,
    classifier: Arc<dyn Classifier>,
    wakeup: Arc<Notify>,
    settings: WorkerSettings,
}

impl Ingestor {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        mail: Arc<dyn MailStore>,
        jobs: Arc<dyn JobQueue>,
        blobs: Arc<dyn BlobStore>,
        classifier: Arc<dyn Classifier>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            accounts,
            mail,
            jobs,
            blobs,
            classifier,
            wakeup: Arc::new(Notify::new()),
            settings: WorkerSettings {
                max_attempts: settings.max_attempts.max(1),
                ..settings
            },
        }
    }

    /// Signal the worker waits on between sweeps.
    pub fn wakeup(&self) -> Arc<Notify> {
        Arc::clone(&self.wakeup)
    }

    /// Hands jobs whose worker went quiet for `stale_after` back to the queue.
    pub async fn requeue_stale(&self) -> Result<u64, StoreError> {
        self.jobs
            .requeue_interrupted(self.settings.stale_after, self.settings.max_attempts)
            .await
    }

    /// Accepts an inbound email.
    ///
    /// On success the email, its attachments and its ingest job are durable
    /// and the worker has been nudged. On failure nothing is left behind:
    /// an unknown alias writes nothing, and a storage failure removes the
    /// blobs written so far.
    pub async fn receive(&self, inbound: InboundEmail) -> Result<IngestReceipt, IngestError> {
        let alias = normalize_alias(&inbound.to);
        let owner = self
            .accounts
            .resolve_alias(&alias)
            .await?
            .ok_or_else(|| IngestError::UnknownAlias(alias.clone()))?;
        log::info!("Email from {} resolved to account {}", inbound.from, owner);

        let mut written: Vec<String> = Vec::with_capacity(inbound.attachments.len());
        let mut attachments = Vec::with_capacity(inbound.attachments.len());
        for part in &inbound.attachments {
            match self.blobs.put(&part.filename, &part.bytes).await {
                Ok(key) => {
                    written.push(key.clone());
                    attachments.push(NewAttachment {
                        filename: part.filename.clone(),
                        filepath: key,
                        mimetype: part.content_type.clone(),
                    });
                }
                Err(e) => {
                    self.discard_blobs(&written).await;
                    return Err(StoreError::Blob(e).into());
                }
            }
        }

        let email = NewEmail {
            user_id: owner,
            from_email: inbound.from,
            subject: inbound.subject,
            body: inbound.text.unwrap_or_default(),
            html_body: inbound.html,
        };
        let email_id = match self.mail.insert_email(email, attachments).await {
            Ok(id) => id,
            Err(e) => {
                self.discard_blobs(&written).await;
                return Err(e.into());
            }
        };
        log::info!(
            "Stored email {} with {} attachment(s) for account {}",
            email_id,
            written.len(),
            owner
        );

        self.wakeup.notify_one();
        Ok(IngestReceipt { email_id, owner })
    }

    async fn discard_blobs(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.blobs.remove(key).await {
                log::warn!("Could not remove orphaned attachment {}: {}", key, e);
            }
        }
    }

    /// Processes due jobs until none are left. Returns how many jobs were
    /// attempted.
    ///
    /// A failed job is not due again until `retry_delay` has passed, so a
    /// drain does not retry it unless the delay is zero.
    pub async fn drain(&self) -> Result<usize, StoreError> {
        let mut attempted = 0;
        loop {
            let batch = self
                .jobs
                .claim_jobs(CLAIM_BATCH, self.settings.max_attempts)
                .await?;
            if batch.is_empty() {
                return Ok(attempted);
            }
            attempted += batch.len();
            for job in batch {
                self.process(job).await;
            }
        }
    }

    async fn process(&self, job: IngestJob) {
        match self.complete(&job).await {
            Ok(Some(task)) => log::info!(
                "Email {} became todo {} at position {}",
                job.email_id,
                task.id,
                task.order_index
            ),
            Ok(None) => log::warn!(
                "Ingest job {} (email {}) was requeued while on attempt {}; dropping its result",
                job.id,
                job.email_id,
                job.attempts
            ),
            Err(e) => {
                log::error!(
                    "Ingest job {} (email {}) failed on attempt {}: {}",
                    job.id,
                    job.email_id,
                    job.attempts,
                    e
                );
                if let Err(e) = self
                    .jobs
                    .fail_job(
                        &job,
                        &e.to_string(),
                        self.settings.max_attempts,
                        self.settings.retry_delay,
                    )
                    .await
                {
                    log::error!("Could not record failure of ingest job {}: {}", job.id, e);
                }
            }
        }
    }

    async fn complete(&self, job: &IngestJob) -> Result<Option<Task>, StoreError> {
        let classification = match &job.classification {
            Some(saved) => saved.clone(),
            None => {
                let classification =
                    classify_or_fallback(self.classifier.as_ref(), &job.subject, &job.body).await;
                self.jobs.save_classification(job.id, &classification).await?;
                classification
            }
        };
        self.jobs
            .complete_job(job, task_from(&classification, job.email_id))
            .await
    }
}

/// The todo derived from a classified email.
pub fn task_from(classification: &Classification, email_id: i32) -> NewTask {
    let title = classification.summary.trim();
    NewTask {
        title: if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title.to_string()
        },
        summary: Some(classification.notes.clone()).filter(|notes| !notes.is_empty()),
        priority: classification.priority,
        deadline: classification.deadline,
        email_id: Some(email_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FALLBACK_NOTES;
    use crate::models::TaskPriority;

    #[test]
    fn test_task_from_fallback_uses_subject() {
        let task = task_from(&Classification::fallback("Pay rent"), 7);
        assert_eq!(task.title, "Pay rent");
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.deadline, None);
        assert_eq!(task.summary.as_deref(), Some(FALLBACK_NOTES));
        assert_eq!(task.email_id, Some(7));
    }

    #[test]
    fn test_task_from_empty_subject() {
        let task = task_from(&Classification::fallback("  "), 1);
        assert_eq!(task.title, UNTITLED);
    }

    #[test]
    fn test_task_from_empty_notes() {
        let classification = Classification {
            summary: "Call the bank".to_string(),
            priority: TaskPriority::High,
            deadline: None,
            notes: String::new(),
        };
        assert_eq!(task_from(&classification, 1).summary, None);
    }
}
