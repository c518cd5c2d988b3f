//! PostgreSQL implementation of the storage traits.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Transaction};
use std::time::Duration;

use super::{
    AccountStore, IngestJob, JobQueue, JobStatus, MailStore, StoreError, StoreResult, TaskStore,
};
use crate::classifier::Classification;
use crate::models::{
    Account, Attachment, Email, EmailDetail, NewAccount, NewAttachment, NewEmail, NewTask, Task,
    TaskUpdate, TaskView,
};
use crate::ordering::{changed_positions, next_position, reorder_plan};

const TASK_COLUMNS: &str =
    "id, user_id, title, summary, priority, deadline, completed, order_index, email_id, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct JobRow {
    id: i32,
    email_id: i32,
    user_id: i32,
    attempts: i32,
    subject: String,
    body: String,
    classification: Option<Json<Classification>>,
}

impl From<JobRow> for IngestJob {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            email_id: row.email_id,
            user_id: row.user_id,
            attempts: row.attempts,
            subject: row.subject,
            body: row.body,
            classification: row.classification.map(|Json(c)| c),
        }
    }
}

impl PgStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending migrations from `./migrations`.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Locks the owner's account row for the rest of the transaction.
///
/// Every statement that allocates or rewrites positions takes this lock first,
/// which serializes them per owner.
async fn lock_owner(tx: &mut Transaction<'_, Postgres>, owner: i32) -> StoreResult<()> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(owner)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(())
}

async fn append_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    owner: i32,
    task: &NewTask,
) -> StoreResult<Task> {
    lock_owner(tx, owner).await?;

    let last = sqlx::query_scalar::<_, Option<i32>>(
        "SELECT MAX(order_index) FROM todos WHERE user_id = $1",
    )
    .bind(owner)
    .fetch_one(&mut **tx)
    .await?;
    let order_index = next_position(last).ok_or(StoreError::PositionsExhausted)?;

    let sql = format!(
        "INSERT INTO todos (user_id, title, summary, priority, deadline, order_index, email_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {}",
        TASK_COLUMNS
    );
    let task = sqlx::query_as::<_, Task>(&sql)
        .bind(owner)
        .bind(&task.title)
        .bind(&task.summary)
        .bind(task.priority)
        .bind(task.deadline)
        .bind(order_index)
        .bind(task.email_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(task)
}

/// Maps unique violations on the `users` table to [`StoreError::Duplicate`].
fn account_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some(name) if name.contains("forward_email") => {
                    StoreError::Duplicate("forwarding alias")
                }
                _ => StoreError::Duplicate("account"),
            };
        }
    }
    StoreError::Database(error)
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, account: NewAccount, seed: Vec<NewTask>) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        let account = sqlx::query_as::<_, Account>(
            "INSERT INTO users (email, password_hash, forward_email)
             VALUES ($1, $2, $3)
             RETURNING id, email, password_hash, forward_email, created_at",
        )
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.forward_email)
        .fetch_one(&mut *tx)
        .await
        .map_err(account_error)?;

        for task in &seed {
            append_in_tx(&mut tx, account.id, task).await?;
        }

        tx.commit().await?;
        Ok(account)
    }

    async fn find_account(&self, id: i32) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, forward_email, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, forward_email, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn resolve_alias(&self, alias: &str) -> StoreResult<Option<i32>> {
        let id = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM users WHERE LOWER(forward_email) = LOWER($1)",
        )
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }
}

#[async_trait]
impl MailStore for PgStore {
    async fn insert_email(
        &self,
        email: NewEmail,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<i32> {
        let mut tx = self.pool.begin().await?;

        let email_id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO emails (user_id, from_email, subject, body, html_body)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(email.user_id)
        .bind(&email.from_email)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(&email.html_body)
        .fetch_one(&mut *tx)
        .await?;

        for attachment in &attachments {
            sqlx::query(
                "INSERT INTO attachments (email_id, filename, filepath, mimetype)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(email_id)
            .bind(&attachment.filename)
            .bind(&attachment.filepath)
            .bind(&attachment.mimetype)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT INTO ingest_jobs (email_id, user_id, status) VALUES ($1, $2, $3)")
            .bind(email_id)
            .bind(email.user_id)
            .bind(JobStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(email_id)
    }

    async fn find_email(&self, owner: i32, email_id: i32) -> StoreResult<Option<EmailDetail>> {
        let email = sqlx::query_as::<_, Email>(
            "SELECT id, user_id, from_email, subject, body, html_body, received_at
             FROM emails WHERE id = $1 AND user_id = $2",
        )
        .bind(email_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        let Some(email) = email else {
            return Ok(None);
        };

        let attachments = sqlx::query_as::<_, Attachment>(
            "SELECT id, email_id, filename, filepath, mimetype
             FROM attachments WHERE email_id = $1 ORDER BY id",
        )
        .bind(email.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(EmailDetail { email, attachments }))
    }

    async fn find_attachment(
        &self,
        owner: i32,
        email_id: i32,
        attachment_id: i32,
    ) -> StoreResult<Option<Attachment>> {
        let attachment = sqlx::query_as::<_, Attachment>(
            "SELECT a.id, a.email_id, a.filename, a.filepath, a.mimetype
             FROM attachments a
             JOIN emails e ON e.id = a.email_id
             WHERE a.id = $1 AND a.email_id = $2 AND e.user_id = $3",
        )
        .bind(attachment_id)
        .bind(email_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attachment)
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn next_order_index(&self, owner: i32) -> StoreResult<i32> {
        let last = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(order_index) FROM todos WHERE user_id = $1",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        next_position(last).ok_or(StoreError::PositionsExhausted)
    }

    async fn append_task(&self, owner: i32, task: NewTask) -> StoreResult<Task> {
        let mut tx = self.pool.begin().await?;
        let task = append_in_tx(&mut tx, owner, &task).await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn list_tasks(&self, owner: i32) -> StoreResult<Vec<TaskView>> {
        let tasks = sqlx::query_as::<_, TaskView>(
            "SELECT t.id, t.user_id, t.title, t.summary, t.priority, t.deadline, t.completed,
                    t.order_index, t.email_id, t.created_at,
                    e.subject AS email_subject, e.from_email
             FROM todos t
             LEFT JOIN emails e ON e.id = t.email_id
             WHERE t.user_id = $1
             ORDER BY t.order_index ASC, t.created_at DESC, t.id DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn find_task(&self, owner: i32, id: i32) -> StoreResult<Option<Task>> {
        let sql = format!("SELECT {} FROM todos WHERE id = $1 AND user_id = $2", TASK_COLUMNS);
        let task = sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn update_task(&self, owner: i32, id: i32, update: &TaskUpdate) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE todos
             SET title = $3, summary = $4, priority = $5, deadline = $6, completed = $7,
                 order_index = COALESCE($8, order_index)
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(&update.title)
        .bind(&update.summary)
        .bind(update.priority.unwrap_or_default())
        .bind(update.deadline)
        .bind(update.completed)
        .bind(update.order_index)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_task(&self, owner: i32, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reorder_tasks(&self, owner: i32, ids: &[i32]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, owner).await?;

        let current = sqlx::query_as::<_, (i32, i32)>(
            "SELECT id, order_index FROM todos WHERE user_id = $1",
        )
        .bind(owner)
        .fetch_all(&mut *tx)
        .await?;

        let plan = reorder_plan(&current, ids);
        for (id, position) in changed_positions(&current, &plan) {
            sqlx::query("UPDATE todos SET order_index = $1 WHERE id = $2 AND user_id = $3")
                .bind(position)
                .bind(id)
                .bind(owner)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgStore {
    async fn requeue_interrupted(
        &self,
        stale_after: Duration,
        max_attempts: i32,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE ingest_jobs
             SET status = CASE WHEN attempts >= $2 THEN 'failed' ELSE 'pending' END,
                 available_at = NOW(),
                 updated_at = NOW()
             WHERE status = 'running'
               AND updated_at <= NOW() - make_interval(secs => $1)",
        )
        .bind(stale_after.as_secs_f64())
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn claim_jobs(&self, limit: i64, max_attempts: i32) -> StoreResult<Vec<IngestJob>> {
        let mut rows = sqlx::query_as::<_, JobRow>(
            "UPDATE ingest_jobs j
             SET status = 'running', attempts = j.attempts + 1, updated_at = NOW()
             FROM emails e
             WHERE e.id = j.email_id
               AND j.id IN (
                   SELECT id FROM ingest_jobs
                   WHERE status = 'pending' AND attempts < $2 AND available_at <= NOW()
                   ORDER BY id
                   LIMIT $1
                   FOR UPDATE SKIP LOCKED
               )
             RETURNING j.id, j.email_id, j.user_id, j.attempts, e.subject,
                       CASE WHEN e.body = '' THEN COALESCE(e.html_body, '') ELSE e.body END AS body,
                       j.classification",
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        rows.sort_by_key(|row| row.id);
        Ok(rows.into_iter().map(IngestJob::from).collect())
    }

    async fn save_classification(
        &self,
        job_id: i32,
        classification: &Classification,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE ingest_jobs SET classification = $1, updated_at = NOW() WHERE id = $2")
            .bind(Json(classification))
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_job(&self, job: &IngestJob, task: NewTask) -> StoreResult<Option<Task>> {
        let mut tx = self.pool.begin().await?;

        // Holding the job row keeps a concurrent requeue from handing it out again.
        let current = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM ingest_jobs
             WHERE id = $1 AND status = 'running' AND attempts = $2 AND todo_id IS NULL
             FOR UPDATE",
        )
        .bind(job.id)
        .bind(job.attempts)
        .fetch_optional(&mut *tx)
        .await?;
        if current.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let task = append_in_tx(&mut tx, job.user_id, &task).await?;

        sqlx::query(
            "UPDATE ingest_jobs
             SET status = $1, todo_id = $2, last_error = NULL, updated_at = NOW()
             WHERE id = $3",
        )
        .bind(JobStatus::Done.as_str())
        .bind(task.id)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(task))
    }

    async fn fail_job(
        &self,
        job: &IngestJob,
        error: &str,
        max_attempts: i32,
        retry_in: Duration,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE ingest_jobs
             SET status = CASE WHEN attempts >= $4 THEN 'failed' ELSE 'pending' END,
                 last_error = $3,
                 available_at = NOW() + make_interval(secs => $5),
                 updated_at = NOW()
             WHERE id = $1 AND attempts = $2 AND status = 'running'",
        )
        .bind(job.id)
        .bind(job.attempts)
        .bind(error)
        .bind(max_attempts)
        .bind(retry_in.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
