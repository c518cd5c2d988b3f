pub mod auth;
pub mod emails;
pub mod health;
pub mod todos;
pub mod user;
pub mod webhook;

use actix_cors::Cors;
use actix_web::web;

/// CORS policy for the web client. Without a configured frontend any origin is
/// allowed. Credentials are always allowed.
pub fn cors(frontend_url: Option<&str>) -> Cors {
    match frontend_url {
        Some(origin) => Cors::default().allowed_origin(origin),
        None => Cors::default().allow_any_origin(),
    }
    .allow_any_method()
    .allow_any_header()
    .supports_credentials()
    .max_age(3600)
}

/// Registers every `/api` route. Authentication is applied by the caller.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::login)
            .service(auth::register),
    )
    .service(webhook::email_webhook)
    .service(user::current_user)
    .service(
        web::scope("/todos")
            .service(todos::list_todos)
            .service(todos::create_todo)
            .service(todos::reorder_todos)
            .service(todos::get_todo)
            .service(todos::update_todo)
            .service(todos::delete_todo),
    )
    .service(
        web::scope("/emails")
            .service(emails::get_email)
            .service(emails::get_attachment),
    );
}
