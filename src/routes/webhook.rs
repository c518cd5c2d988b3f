use crate::{
    error::AppError,
    ingest::{InboundEmail, InboundPart},
    state::AppState,
};
use actix_multipart::{Field, Multipart};
use actix_web::{post, web, HttpResponse, Responder};
use futures::TryStreamExt;
use serde_json::json;

/// Receives an inbound email from the mail provider.
///
/// The body is `multipart/form-data` with text fields `from`, `to`,
/// `subject`, `text` and `html` and file parts named `attachments`. The
/// whole payload is buffered, up to `MAX_UPLOAD_BYTES`, before the
/// destination alias is looked up, so a rejected email writes nothing.
///
/// The response only covers storing the email. The todo is created in the
/// background afterwards.
///
/// ## Responses:
/// - `200 OK`: `{ "message": "Email processed successfully" }`.
/// - `400 Bad Request`: Malformed form, missing `from`/`to`, or oversized payload.
/// - `404 Not Found`: No account owns the `to` address.
/// - `500 Internal Server Error`: The email could not be stored.
#[post("/email-webhook")]
pub async fn email_webhook(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<impl Responder, AppError> {
    let inbound = read_inbound(payload, state.settings.max_upload_bytes).await?;
    let receipt = state.ingestor.receive(inbound).await?;
    log::info!("Acknowledged email {} for account {}", receipt.email_id, receipt.owner);

    Ok(HttpResponse::Ok().json(json!({ "message": "Email processed successfully" })))
}

async fn read_inbound(mut payload: Multipart, limit: usize) -> Result<InboundEmail, AppError> {
    let mut inbound = InboundEmail::default();
    let mut from = None;
    let mut to = None;
    let mut total = 0usize;

    while let Some(field) = payload.try_next().await? {
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_string);
        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let bytes = read_field(field, &mut total, limit).await?;

        match (name.as_str(), filename) {
            ("attachments", Some(filename)) => {
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                inbound.attachments.push(InboundPart {
                    filename,
                    content_type,
                    bytes,
                });
            }
            (other, Some(filename)) => {
                log::warn!("Ignoring file `{}` uploaded as field `{}`", filename, other)
            }
            ("from", None) => from = Some(into_text(bytes)),
            ("to", None) => to = Some(into_text(bytes)),
            ("subject", None) => inbound.subject = into_text(bytes),
            ("text", None) => inbound.text = Some(into_text(bytes)),
            ("html", None) => inbound.html = Some(into_text(bytes)).filter(|html| !html.is_empty()),
            (other, None) => log::debug!("Ignoring webhook field `{}`", other),
        }
    }

    inbound.from = from
        .filter(|from| !from.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing `from` field".into()))?;
    inbound.to = to
        .filter(|to| !to.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing `to` field".into()))?;
    Ok(inbound)
}

async fn read_field(mut field: Field, total: &mut usize, limit: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        *total += chunk.len();
        if *total > limit {
            return Err(AppError::BadRequest(format!(
                "Payload exceeds {} bytes",
                limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn into_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
