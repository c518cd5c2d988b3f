//! Storage seams.
//!
//! Each concern the pipeline and the handlers persist through is a trait.
//! [`PgStore`] implements all of them on PostgreSQL, [`MemoryStore`] in
//! process. Components receive the handles they need explicitly.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::classifier::Classification;
use crate::models::{
    Account, Attachment, EmailDetail, NewAccount, NewAttachment, NewEmail, NewTask, Task,
    TaskUpdate, TaskView,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated.
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("blob storage error: {0}")]
    Blob(#[from] std::io::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The owner's last todo already sits at the largest representable position.
    #[error("no position left after the owner's last todo")]
    PositionsExhausted,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates an account and appends `seed` to its (empty) todo list, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the login email or the alias is taken.
    async fn create_account(&self, account: NewAccount, seed: Vec<NewTask>) -> StoreResult<Account>;

    async fn find_account(&self, id: i32) -> StoreResult<Option<Account>>;

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    /// Maps a normalized forwarding alias to the owning account id.
    async fn resolve_alias(&self, alias: &str) -> StoreResult<Option<i32>>;
}

#[async_trait]
pub trait MailStore: Send + Sync {
    /// Persists an email, its attachment rows and its ingest job as one unit.
    /// Returns the new email id.
    async fn insert_email(
        &self,
        email: NewEmail,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<i32>;

    async fn find_email(&self, owner: i32, email_id: i32) -> StoreResult<Option<EmailDetail>>;

    async fn find_attachment(
        &self,
        owner: i32,
        email_id: i32,
        attachment_id: i32,
    ) -> StoreResult<Option<Attachment>>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// The position the next appended todo would get. Read-only; inserts go
    /// through [`TaskStore::append_task`], which allocates atomically.
    async fn next_order_index(&self, owner: i32) -> StoreResult<i32>;

    /// Inserts a todo at the end of the owner's list.
    ///
    /// Allocation and insertion happen under a per-owner lock, so concurrent
    /// appends never share a position.
    async fn append_task(&self, owner: i32, task: NewTask) -> StoreResult<Task>;

    /// The owner's todos by position, newest first among equal positions.
    async fn list_tasks(&self, owner: i32) -> StoreResult<Vec<TaskView>>;

    async fn find_task(&self, owner: i32, id: i32) -> StoreResult<Option<Task>>;

    /// Replaces a todo's fields. Returns `false` when the owner has no such todo.
    async fn update_task(&self, owner: i32, id: i32, update: &TaskUpdate) -> StoreResult<bool>;

    /// Returns `false` when the owner has no such todo.
    async fn delete_task(&self, owner: i32, id: i32) -> StoreResult<bool>;

    /// Applies [`crate::ordering::reorder_plan`] to the owner's todos in one unit.
    async fn reorder_tasks(&self, owner: i32, ids: &[i32]) -> StoreResult<()>;
}

/// Lifecycle of an ingest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

/// A claimed outbox entry, with what classification needs from its email.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestJob {
    pub id: i32,
    pub email_id: i32,
    pub user_id: i32,
    /// Attempts including the current one.
    pub attempts: i32,
    pub subject: String,
    /// Text body, or the HTML body when the text body is empty.
    pub body: String,
    /// Classification saved by an earlier attempt.
    pub classification: Option<Classification>,
}

/// The outbox of emails waiting to become todos.
///
/// A claim is identified by the job id together with its attempt number.
/// Completing or failing a job only takes effect while that claim is still
/// current, so a worker whose job was requeued and claimed again elsewhere
/// cannot produce a second todo.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns `running` jobs untouched for at least `stale_after` to
    /// `pending`, or to `failed` when they have used up `max_attempts`.
    async fn requeue_interrupted(&self, stale_after: Duration, max_attempts: i32)
        -> StoreResult<u64>;

    /// Claims up to `limit` due pending jobs with fewer than `max_attempts`
    /// attempts, marking them running and counting the attempt.
    async fn claim_jobs(&self, limit: i64, max_attempts: i32) -> StoreResult<Vec<IngestJob>>;

    async fn save_classification(
        &self,
        job_id: i32,
        classification: &Classification,
    ) -> StoreResult<()>;

    /// Appends the job's todo and marks the job done, atomically. Returns
    /// `None` and appends nothing when `job` is no longer the current claim.
    async fn complete_job(&self, job: &IngestJob, task: NewTask) -> StoreResult<Option<Task>>;

    /// Records a failed attempt. The job goes back to pending, due again after
    /// `retry_in`, or to failed once `max_attempts` is reached. A claim that is
    /// no longer current records nothing.
    async fn fail_job(
        &self,
        job: &IngestJob,
        error: &str,
        max_attempts: i32,
        retry_in: Duration,
    ) -> StoreResult<()>;
}
