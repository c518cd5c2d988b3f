use crate::{
    auth::{
        generate_token, hash_password, verify_password, AuthResponse, LoginRequest, RegisterRequest,
    },
    error::AppError,
    models::{generate_forward_email, welcome_tasks, NewAccount},
    state::AppState,
    store::StoreError,
};
use actix_web::{post, web, HttpResponse, Responder};
use validator::Validate;

/// Fresh aliases tried before registration gives up.
const ALIAS_ATTEMPTS: usize = 3;

/// Register a new account
///
/// Creates the account with a freshly generated forwarding alias and the
/// welcome todos, and returns an authentication token.
///
/// ## Responses:
/// - `201 Created`: `{ token, user_id, forward_email }`.
/// - `400 Bad Request`: If the email is already registered.
/// - `422 Unprocessable Entity`: If the email or password is invalid.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let RegisterRequest { email, password } = register_data.into_inner();
    let email = email.trim().to_string();

    if state.accounts.find_account_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest("Email already registered".into()));
    }

    let password_hash = hash_password(&password)?;

    let mut attempt = 0;
    let account = loop {
        attempt += 1;
        let new_account = NewAccount {
            email: email.clone(),
            password_hash: password_hash.clone(),
            forward_email: generate_forward_email(&state.settings.email_domain),
        };
        match state.accounts.create_account(new_account, welcome_tasks()).await {
            Ok(account) => break account,
            Err(StoreError::Duplicate("forwarding alias")) if attempt < ALIAS_ATTEMPTS => {
                log::warn!("Generated alias collided, retrying");
            }
            Err(StoreError::Duplicate("account")) => {
                return Err(AppError::BadRequest("Email already registered".into()));
            }
            Err(e) => return Err(e.into()),
        }
    };
    log::info!("Registered account {} with alias {}", account.id, account.forward_email);

    let token = generate_token(account.id)?;

    Ok(HttpResponse::Created().json(AuthResponse {
        token,
        user_id: account.id,
        forward_email: account.forward_email,
    }))
}

/// Login
///
/// Authenticates an account by email and password and returns a token.
///
/// ## Responses:
/// - `200 OK`: `{ token, user_id, forward_email }`.
/// - `401 Unauthorized`: Unknown email or wrong password.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;

    let account = state
        .accounts
        .find_account_by_email(login_data.email.trim())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    if !verify_password(&login_data.password, &account.password_hash)? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = generate_token(account.id)?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user_id: account.id,
        forward_email: account.forward_email,
    }))
}
