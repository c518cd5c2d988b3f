use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Represents the priority of a todo.
/// Corresponds to the `task_priority` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    /// High priority.
    High,
    /// Medium priority. Used whenever no priority is given.
    #[default]
    Medium,
    /// Low priority.
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "HIGH",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::Low => "LOW",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive parse of `HIGH`, `MEDIUM` or `LOW`.
impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(TaskPriority::High),
            "MEDIUM" => Ok(TaskPriority::Medium),
            "LOW" => Ok(TaskPriority::Low),
            other => Err(format!("unknown priority `{}`", other)),
        }
    }
}

/// Input structure for creating a todo by hand.
/// Contains validation rules for its fields.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TaskInput {
    /// The title of the todo.
    /// Must be between 1 and 200 characters.
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// Optional notes for the todo.
    /// Maximum length of 1000 characters if provided.
    #[validate(length(max = 1000))]
    pub summary: Option<String>,

    /// Priority of the todo; `MEDIUM` when omitted.
    pub priority: Option<TaskPriority>,

    /// Optional deadline (calendar date, `YYYY-MM-DD`).
    pub deadline: Option<NaiveDate>,
}

/// Full-row replacement sent when a todo is edited.
///
/// Every field is overwritten. `order_index` is the one exception: when it is
/// omitted the current position is kept. It must lie in `1..=MAX_POSITION`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TaskUpdate {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub summary: Option<String>,
    pub priority: Option<TaskPriority>,
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[validate(range(min = 1, max = 1_000_000))]
    pub order_index: Option<i32>,
}

/// Payload of the reorder endpoint: todo ids in their new order.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReorderRequest {
    #[serde(alias = "todoIds")]
    pub todo_ids: Vec<i32>,
}

/// Represents a todo as stored in the database and returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    /// Identifier of the todo.
    pub id: i32,
    /// Identifier of the account owning the todo.
    pub user_id: i32,
    /// The title of the todo.
    pub title: String,
    /// Optional notes; for AI-derived todos these are the model's notes.
    pub summary: Option<String>,
    /// The priority of the todo.
    pub priority: TaskPriority,
    /// Optional deadline.
    pub deadline: Option<NaiveDate>,
    /// Whether the todo has been completed.
    pub completed: bool,
    /// Position in the owner's list. Only comparable between todos of the same owner.
    pub order_index: i32,
    /// Email this todo was derived from, if any. The email may since have been deleted.
    pub email_id: Option<i32>,
    /// Timestamp of when the todo was created.
    pub created_at: DateTime<Utc>,
}

/// A todo together with the subject and sender of its originating email,
/// as shown in the todo list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub task: Task,
    pub email_subject: Option<String>,
    pub from_email: Option<String>,
}

/// A todo about to be appended to an owner's list. The position is assigned
/// by the store at insertion time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub summary: Option<String>,
    pub priority: TaskPriority,
    pub deadline: Option<NaiveDate>,
    pub email_id: Option<i32>,
}

impl From<TaskInput> for NewTask {
    fn from(input: TaskInput) -> Self {
        Self {
            title: input.title,
            summary: input.summary,
            priority: input.priority.unwrap_or_default(),
            deadline: input.deadline,
            email_id: None,
        }
    }
}

/// The three todos every new account starts with.
pub fn welcome_tasks() -> Vec<NewTask> {
    vec![
        NewTask {
            title: "Welcome to ToDone! 🎉".to_string(),
            summary: Some(
                "This is your first todo. You can edit, delete, or drag to reorder it."
                    .to_string(),
            ),
            priority: TaskPriority::High,
            deadline: None,
            email_id: None,
        },
        NewTask {
            title: "Forward your first email".to_string(),
            summary: Some(
                "Try forwarding an email to your unique address to see AI-powered todo creation in action!"
                    .to_string(),
            ),
            priority: TaskPriority::Medium,
            deadline: None,
            email_id: None,
        },
        NewTask {
            title: "Explore the features".to_string(),
            summary: Some(
                "Drag todos to reorder, click 'View Email' on AI-generated todos, and mark items as complete."
                    .to_string(),
            ),
            priority: TaskPriority::Low,
            deadline: None,
            email_id: None,
        },
    ]
}
