use crate::{
    auth::AuthenticatedUserId,
    error::AppError,
    models::{NewTask, ReorderRequest, TaskInput, TaskUpdate},
    state::AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;
use validator::Validate;

/// Retrieves the authenticated account's todos.
///
/// Todos are ordered by position, newest first among equal positions. Each
/// entry carries `email_subject` and `from_email` of the email it was derived
/// from, or `null` for todos created by hand.
///
/// ## Responses:
/// - `200 OK`: Returns a JSON array of todos.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
#[get("")]
pub async fn list_todos(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let todos = state.tasks.list_tasks(user_id.0).await?;
    Ok(HttpResponse::Ok().json(todos))
}

/// Creates a todo at the end of the authenticated account's list.
///
/// ## Request Body:
/// - `title`: 1 to 200 characters (required).
/// - `summary` (optional): at most 1000 characters.
/// - `priority` (optional): `HIGH`, `MEDIUM` or `LOW`. Defaults to `MEDIUM`.
/// - `deadline` (optional): `YYYY-MM-DD`.
///
/// ## Responses:
/// - `201 Created`: Returns the new todo.
/// - `422 Unprocessable Entity`: If validation fails.
#[post("")]
pub async fn create_todo(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
    todo_data: web::Json<TaskInput>,
) -> Result<impl Responder, AppError> {
    todo_data.validate()?;

    let task = state
        .tasks
        .append_task(user_id.0, NewTask::from(todo_data.into_inner()))
        .await?;

    Ok(HttpResponse::Created().json(task))
}

/// Applies a new order to the authenticated account's todos.
///
/// Listed todos take positions 1, 2, ... in the given order. Todos left out
/// keep their relative order after the listed ones. Ids the account does not
/// own are ignored.
#[post("/reorder")]
pub async fn reorder_todos(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
    reorder_data: web::Json<ReorderRequest>,
) -> Result<impl Responder, AppError> {
    state
        .tasks
        .reorder_tasks(user_id.0, &reorder_data.todo_ids)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Todos reordered successfully" })))
}

/// Retrieves one todo.
///
/// ## Responses:
/// - `200 OK`: Returns the todo.
/// - `404 Not Found`: If the todo does not exist or belongs to another account.
#[get("/{id}")]
pub async fn get_todo(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
    todo_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let task = state
        .tasks
        .find_task(user_id.0, todo_id.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Todo not found".into()))?;

    Ok(HttpResponse::Ok().json(task))
}

/// Replaces a todo's fields.
///
/// An omitted `order_index` keeps the current position; an omitted priority
/// becomes `MEDIUM`. Editing a todo that does not exist or belongs to
/// another account changes nothing and still succeeds.
#[put("/{id}")]
pub async fn update_todo(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
    todo_id: web::Path<i32>,
    todo_data: web::Json<TaskUpdate>,
) -> Result<impl Responder, AppError> {
    todo_data.validate()?;
    let todo_id = todo_id.into_inner();

    if !state.tasks.update_task(user_id.0, todo_id, &todo_data).await? {
        log::debug!("Update of todo {} by account {} matched nothing", todo_id, user_id.0);
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Todo updated successfully" })))
}

/// Deletes a todo. Like editing, an id the account does not own is a no-op.
#[delete("/{id}")]
pub async fn delete_todo(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
    todo_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let todo_id = todo_id.into_inner();

    if !state.tasks.delete_task(user_id.0, todo_id).await? {
        log::debug!("Delete of todo {} by account {} matched nothing", todo_id, user_id.0);
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Todo deleted successfully" })))
}
