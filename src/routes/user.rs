use crate::{auth::AuthenticatedUserId, error::AppError, models::AccountProfile, state::AppState};
use actix_web::{get, web, HttpResponse, Responder};

/// Current account
///
/// Returns `{ id, email, forward_email }` for the authenticated account.
#[get("/user")]
pub async fn current_user(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let account = state
        .accounts
        .find_account(user_id.0)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(HttpResponse::Ok().json(AccountProfile::from(&account)))
}
