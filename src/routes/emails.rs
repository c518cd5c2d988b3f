use crate::{auth::AuthenticatedUserId, error::AppError, state::AppState};
use actix_web::{get, http::header, web, HttpResponse, Responder};

/// Retrieves an email with its attachment metadata.
///
/// ## Responses:
/// - `200 OK`: The email and an `attachments` array (`id`, `filename`, `mimetype`).
/// - `404 Not Found`: If the email does not exist or belongs to another account.
#[get("/{id}")]
pub async fn get_email(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
    email_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let email = state
        .mail
        .find_email(user_id.0, email_id.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Email not found".into()))?;

    Ok(HttpResponse::Ok().json(email))
}

/// Downloads an attachment, served with its stored MIME type.
#[get("/{id}/attachments/{attachment_id}")]
pub async fn get_attachment(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
    path: web::Path<(i32, i32)>,
) -> Result<impl Responder, AppError> {
    let (email_id, attachment_id) = path.into_inner();

    let attachment = state
        .mail
        .find_attachment(user_id.0, email_id, attachment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attachment not found".into()))?;

    let bytes = state.blobs.get(&attachment.filepath).await.map_err(|e| {
        log::error!("Attachment {} is missing from storage: {}", attachment.id, e);
        AppError::InternalServerError("Attachment could not be read".into())
    })?;

    let disposition = header::ContentDisposition {
        disposition: header::DispositionType::Attachment,
        parameters: vec![header::DispositionParam::Filename(attachment.filename.clone())],
    };

    Ok(HttpResponse::Ok()
        .content_type(attachment.mimetype.as_str())
        .insert_header(disposition)
        .body(bytes))
}
