//! In-process store used by tests and as a test double for the Postgres store.
//!
//! All state sits behind one mutex, which makes every trait method atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{
    AccountStore, IngestJob, JobQueue, JobStatus, MailStore, StoreError, StoreResult, TaskStore,
};
use crate::classifier::Classification;
use crate::models::{
    Account, Attachment, Email, EmailDetail, NewAccount, NewAttachment, NewEmail, NewTask, Task,
    TaskUpdate, TaskView,
};
use crate::ordering::{next_position, reorder_plan};

/// Snapshot of an ingest job, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i32,
    pub email_id: i32,
    pub user_id: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub classification: Option<Classification>,
    pub last_error: Option<String>,
    pub todo_id: Option<i32>,
    /// Earliest time the job can be claimed.
    pub available_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Whether `claim` is this job's current claim.
    fn is_claimed_by(&self, claim: &IngestJob) -> bool {
        self.id == claim.id
            && self.status == JobStatus::Running
            && self.attempts == claim.attempts
            && self.todo_id.is_none()
    }
}

/// `now + delay`, or an error when that is not a representable time.
fn after(now: DateTime<Utc>, delay: Duration) -> StoreResult<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .ok_or_else(|| StoreError::Unavailable(format!("retry delay {:?} is out of range", delay)))
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i32,
    accounts: Vec<Account>,
    emails: Vec<Email>,
    attachments: Vec<Attachment>,
    tasks: Vec<Task>,
    jobs: Vec<JobRecord>,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn next_position(&self, owner: i32) -> StoreResult<i32> {
        next_position(
            self.tasks
                .iter()
                .filter(|t| t.user_id == owner)
                .map(|t| t.order_index),
        )
        .ok_or(StoreError::PositionsExhausted)
    }

    fn append(&mut self, owner: i32, task: NewTask) -> StoreResult<Task> {
        let order_index = self.next_position(owner)?;
        let task = Task {
            id: self.next_id(),
            user_id: owner,
            title: task.title,
            summary: task.summary,
            priority: task.priority,
            deadline: task.deadline,
            completed: false,
            order_index,
            email_id: task.email_id,
            created_at: Utc::now(),
        };
        self.tasks.push(task.clone());
        Ok(task)
    }
}

/// Thread-safe in-memory implementation of every storage trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// All stored emails.
    pub fn emails(&self) -> Vec<Email> {
        self.lock().map(|s| s.emails.clone()).unwrap_or_default()
    }

    /// All stored attachment rows.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.lock().map(|s| s.attachments.clone()).unwrap_or_default()
    }

    /// All ingest jobs.
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.lock().map(|s| s.jobs.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: NewAccount, seed: Vec<NewTask>) -> StoreResult<Account> {
        let mut state = self.lock()?;
        if state.accounts.iter().any(|a| a.email == account.email) {
            return Err(StoreError::Duplicate("account"));
        }
        if state
            .accounts
            .iter()
            .any(|a| a.forward_email == account.forward_email)
        {
            return Err(StoreError::Duplicate("forwarding alias"));
        }

        let account = Account {
            id: state.next_id(),
            email: account.email,
            password_hash: account.password_hash,
            forward_email: account.forward_email,
            created_at: Utc::now(),
        };
        state.accounts.push(account.clone());
        for task in seed {
            state.append(account.id, task)?;
        }
        Ok(account)
    }

    async fn find_account(&self, id: i32) -> StoreResult<Option<Account>> {
        let state = self.lock()?;
        Ok(state.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let state = self.lock()?;
        Ok(state.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn resolve_alias(&self, alias: &str) -> StoreResult<Option<i32>> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .iter()
            .find(|a| a.forward_email.eq_ignore_ascii_case(alias))
            .map(|a| a.id))
    }
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn insert_email(
        &self,
        email: NewEmail,
        attachments: Vec<NewAttachment>,
    ) -> StoreResult<i32> {
        let mut state = self.lock()?;
        let email_id = state.next_id();
        let user_id = email.user_id;
        state.emails.push(Email {
            id: email_id,
            user_id,
            from_email: email.from_email,
            subject: email.subject,
            body: email.body,
            html_body: email.html_body,
            received_at: Utc::now(),
        });
        for attachment in attachments {
            let id = state.next_id();
            state.attachments.push(Attachment {
                id,
                email_id,
                filename: attachment.filename,
                filepath: attachment.filepath,
                mimetype: attachment.mimetype,
            });
        }
        let job_id = state.next_id();
        let now = Utc::now();
        state.jobs.push(JobRecord {
            id: job_id,
            email_id,
            user_id,
            status: JobStatus::Pending,
            attempts: 0,
            classification: None,
            last_error: None,
            todo_id: None,
            available_at: now,
            updated_at: now,
        });
        Ok(email_id)
    }

    async fn find_email(&self, owner: i32, email_id: i32) -> StoreResult<Option<EmailDetail>> {
        let state = self.lock()?;
        let Some(email) = state
            .emails
            .iter()
            .find(|e| e.id == email_id && e.user_id == owner)
        else {
            return Ok(None);
        };
        let attachments = state
            .attachments
            .iter()
            .filter(|a| a.email_id == email_id)
            .cloned()
            .collect();
        Ok(Some(EmailDetail {
            email: email.clone(),
            attachments,
        }))
    }

    async fn find_attachment(
        &self,
        owner: i32,
        email_id: i32,
        attachment_id: i32,
    ) -> StoreResult<Option<Attachment>> {
        let state = self.lock()?;
        let owns_email = state
            .emails
            .iter()
            .any(|e| e.id == email_id && e.user_id == owner);
        if !owns_email {
            return Ok(None);
        }
        Ok(state
            .attachments
            .iter()
            .find(|a| a.id == attachment_id && a.email_id == email_id)
            .cloned())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn next_order_index(&self, owner: i32) -> StoreResult<i32> {
        self.lock()?.next_position(owner)
    }

    async fn append_task(&self, owner: i32, task: NewTask) -> StoreResult<Task> {
        self.lock()?.append(owner, task)
    }

    async fn list_tasks(&self, owner: i32) -> StoreResult<Vec<TaskView>> {
        let state = self.lock()?;
        let mut tasks: Vec<TaskView> = state
            .tasks
            .iter()
            .filter(|t| t.user_id == owner)
            .map(|t| {
                let email = t
                    .email_id
                    .and_then(|id| state.emails.iter().find(|e| e.id == id));
                TaskView {
                    task: t.clone(),
                    email_subject: email.map(|e| e.subject.clone()),
                    from_email: email.map(|e| e.from_email.clone()),
                }
            })
            .collect();
        tasks.sort_by(|a, b| {
            a.task
                .order_index
                .cmp(&b.task.order_index)
                .then(b.task.created_at.cmp(&a.task.created_at))
                .then(b.task.id.cmp(&a.task.id))
        });
        Ok(tasks)
    }

    async fn find_task(&self, owner: i32, id: i32) -> StoreResult<Option<Task>> {
        let state = self.lock()?;
        Ok(state
            .tasks
            .iter()
            .find(|t| t.id == id && t.user_id == owner)
            .cloned())
    }

    async fn update_task(&self, owner: i32, id: i32, update: &TaskUpdate) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let Some(task) = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.user_id == owner)
        else {
            return Ok(false);
        };
        task.title = update.title.clone();
        task.summary = update.summary.clone();
        task.priority = update.priority.unwrap_or_default();
        task.deadline = update.deadline;
        task.completed = update.completed;
        if let Some(order_index) = update.order_index {
            task.order_index = order_index;
        }
        Ok(true)
    }

    async fn delete_task(&self, owner: i32, id: i32) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let before = state.tasks.len();
        state.tasks.retain(|t| !(t.id == id && t.user_id == owner));
        Ok(state.tasks.len() != before)
    }

    async fn reorder_tasks(&self, owner: i32, ids: &[i32]) -> StoreResult<()> {
        let mut state = self.lock()?;
        let current: Vec<(i32, i32)> = state
            .tasks
            .iter()
            .filter(|t| t.user_id == owner)
            .map(|t| (t.id, t.order_index))
            .collect();
        for (id, position) in reorder_plan(&current, ids) {
            if let Some(task) = state
                .tasks
                .iter_mut()
                .find(|t| t.id == id && t.user_id == owner)
            {
                task.order_index = position;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryStore {
    async fn requeue_interrupted(
        &self,
        stale_after: Duration,
        max_attempts: i32,
    ) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut count = 0;
        for job in state.jobs.iter_mut().filter(|j| j.status == JobStatus::Running) {
            let idle = (now - job.updated_at).to_std().unwrap_or_default();
            if idle < stale_after {
                continue;
            }
            job.status = if job.attempts >= max_attempts {
                JobStatus::Failed
            } else {
                JobStatus::Pending
            };
            job.available_at = now;
            job.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn claim_jobs(&self, limit: i64, max_attempts: i32) -> StoreResult<Vec<IngestJob>> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let limit = usize::try_from(limit).unwrap_or(0);
        let now = Utc::now();
        let mut claimed = Vec::new();

        for job in state
            .jobs
            .iter_mut()
            .filter(|j| {
                j.status == JobStatus::Pending && j.attempts < max_attempts && j.available_at <= now
            })
            .take(limit)
        {
            let Some(email) = state.emails.iter().find(|e| e.id == job.email_id) else {
                continue;
            };
            job.status = JobStatus::Running;
            job.attempts += 1;
            job.updated_at = now;
            let body = if email.body.is_empty() {
                email.html_body.clone().unwrap_or_default()
            } else {
                email.body.clone()
            };
            claimed.push(IngestJob {
                id: job.id,
                email_id: job.email_id,
                user_id: job.user_id,
                attempts: job.attempts,
                subject: email.subject.clone(),
                body,
                classification: job.classification.clone(),
            });
        }
        Ok(claimed)
    }

    async fn save_classification(
        &self,
        job_id: i32,
        classification: &Classification,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.classification = Some(classification.clone());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_job(&self, job: &IngestJob, task: NewTask) -> StoreResult<Option<Task>> {
        let mut state = self.lock()?;
        if !state.jobs.iter().any(|j| j.is_claimed_by(job)) {
            return Ok(None);
        }
        let task = state.append(job.user_id, task)?;
        if let Some(record) = state.jobs.iter_mut().find(|j| j.id == job.id) {
            record.status = JobStatus::Done;
            record.todo_id = Some(task.id);
            record.last_error = None;
            record.updated_at = Utc::now();
        }
        Ok(Some(task))
    }

    async fn fail_job(
        &self,
        job: &IngestJob,
        error: &str,
        max_attempts: i32,
        retry_in: Duration,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let available_at = after(now, retry_in)?;
        if let Some(record) = state.jobs.iter_mut().find(|j| j.is_claimed_by(job)) {
            record.status = if record.attempts >= max_attempts {
                JobStatus::Failed
            } else {
                JobStatus::Pending
            };
            record.last_error = Some(error.to_string());
            record.available_at = available_at;
            record.updated_at = now;
        }
        Ok(())
    }
}
