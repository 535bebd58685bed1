use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::auth::{issue_session_token, RequestContext};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::mailer::Mailer;
use crate::response::{ok, ok_empty};
use crate::service::{account, reset_token};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/logout").route(web::post().to(logout)))
        .service(web::resource("/resetRequest").route(web::post().to(reset_request)))
        .service(
            web::resource("/reset/{token}")
                .route(web::get().to(check_reset_token))
                .route(web::post().to(reset_password)),
        );
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    confirm_password: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user_id: i32,
    username: String,
    is_admin: bool,
}

#[derive(Deserialize)]
struct ResetRequest {
    email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest {
    password: Option<String>,
    confirm_password: Option<String>,
}

#[derive(Serialize)]
struct TokenStatus {
    valid: bool,
}

fn required(field: &str, value: &Option<String>) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(AppError::param_error(field, format!("{} cannot be empty", field))),
    }
}

fn check_confirmation(password: &str, confirm: &Option<String>) -> Result<(), AppError> {
    if let Some(confirm) = confirm {
        if confirm != password {
            return Err(AppError::param_error("confirm_password", "Passwords must match"));
        }
    }
    Ok(())
}

async fn register(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    if ctx.identity().is_some() {
        return Err(AppError::fail("already logged in"));
    }
    let password = required("password", &payload.password)?;
    check_confirmation(&password, &payload.confirm_password)?;

    let user = account::register(
        db.get_ref(),
        account::Registration {
            username: required("username", &payload.username)?,
            email: required("email", &payload.email)?,
            password,
        },
    )
    .await?;
    Ok(ok(user.id))
}

async fn login(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let login = required("email", &payload.email)?;
    let password = required("password", &payload.password)?;

    let user = account::authenticate(db.get_ref(), &login, &password).await?;
    let token = issue_session_token(&config, user.id)?;
    Ok(ok(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        is_admin: user.is_admin,
    }))
}

/// Sessions are stateless tokens; the client drops its copy.
async fn logout(ctx: RequestContext) -> Result<HttpResponse, AppError> {
    ctx.require_login()?;
    Ok(ok_empty())
}

async fn reset_request(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    mailer: web::Data<dyn Mailer>,
    payload: web::Json<ResetRequest>,
) -> Result<HttpResponse, AppError> {
    let email = required("email", &payload.email)?;
    reset_token::request_reset(
        db.get_ref(),
        mailer.get_ref(),
        &email,
        config.reset_token_ttl_secs,
        |token| config.reset_link(token),
    )
    .await?;
    Ok(ok_empty())
}

async fn check_reset_token(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let valid = reset_token::verify_token(db.get_ref(), &path).await?.is_some();
    Ok(ok(TokenStatus { valid }))
}

async fn reset_password(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
    payload: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let password = required("password", &payload.password)?;
    check_confirmation(&password, &payload.confirm_password)?;
    reset_token::reset_password(db.get_ref(), &path, &password).await?;
    Ok(ok_empty())
}
