pub mod account;
pub mod email;
pub mod task;

pub use account::{generate_forward_email, normalize_alias, Account, AccountProfile, NewAccount};
pub use email::{Attachment, Email, EmailDetail, NewAttachment, NewEmail};
pub use task::{
    welcome_tasks, NewTask, ReorderRequest, Task, TaskInput, TaskPriority, TaskUpdate, TaskView,
};
