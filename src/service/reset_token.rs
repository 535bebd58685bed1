//! Password recovery tokens.
//!
//! Each user holds at most one live token in `reset_token`/`reset_token_expiry`.
//! Issuing overwrites the slot, consuming clears it together with the password
//! change, and expiry is only ever checked when a token is presented.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::{rngs::OsRng, RngCore};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};

use super::account::{check_new_password, find_by_email};
use crate::entity::user;
use crate::error::{map_tx_error, AppError};
use crate::mailer::Mailer;
use crate::password::hash_password;

pub const DEFAULT_TTL_SECS: i64 = 1800;
const TOKEN_BYTES: usize = 32;

/// 32 random bytes, base64url without padding (43 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub async fn issue_token(db: &DatabaseConnection, user_id: i32, ttl_secs: i64) -> Result<String, AppError> {
    let token = generate_token();
    let expiry = Utc::now() + Duration::seconds(ttl_secs);
    let updated = user::Entity::update_many()
        .col_expr(user::Column::ResetToken, Expr::value(token.clone()))
        .col_expr(user::Column::ResetTokenExpiry, Expr::value(expiry))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await
        .map_err(|e| AppError::db("issue reset token", e))?;
    if updated.rows_affected == 0 {
        return Err(AppError::not_found("user"));
    }
    info!("issued reset token for user {} valid until {}", user_id, expiry);
    Ok(token)
}

/// The owner of `token` if it is still live. Unknown, replaced, consumed and
/// expired tokens all come back as `None`.
pub async fn verify_token(db: &DatabaseConnection, token: &str) -> Result<Option<user::Model>, AppError> {
    verify_token_at(db, token, Utc::now()).await
}

pub async fn verify_token_at(
    db: &DatabaseConnection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<user::Model>, AppError> {
    if token.is_empty() {
        return Ok(None);
    }
    let found = user::Entity::find()
        .filter(user::Column::ResetToken.eq(token))
        .one(db)
        .await
        .map_err(|e| AppError::db("verify reset token", e))?;
    Ok(found.filter(|u| u.reset_token_expiry.map(|exp| exp > now).unwrap_or(false)))
}

/// Sets the new password and clears the token in one statement. The update is
/// conditional on the slot still holding the token the caller verified and on
/// that token not having expired since, so a second consumer, a consumer racing
/// a re-issue, or one arriving after expiry matches no row.
pub async fn consume_token(
    db: &DatabaseConnection,
    user: &user::Model,
    new_password: &str,
) -> Result<(), AppError> {
    let token = user
        .reset_token
        .clone()
        .ok_or_else(|| AppError::fail("That is an invalid or expired token"))?;
    check_new_password("password", new_password)?;
    let password_hash = hash_password(new_password)?;
    let user_id = user.id;

    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            let now = Utc::now();
            let result = user::Entity::update_many()
                .col_expr(user::Column::PasswordHash, Expr::value(password_hash))
                .col_expr(user::Column::ResetToken, Expr::value(Option::<String>::None))
                .col_expr(
                    user::Column::ResetTokenExpiry,
                    Expr::value(Option::<DateTime<Utc>>::None),
                )
                .filter(user::Column::Id.eq(user_id))
                .filter(user::Column::ResetToken.eq(token))
                .filter(user::Column::ResetTokenExpiry.gt(now))
                .exec(txn)
                .await
                .map_err(|e| AppError::db("consume reset token", e))?;
            if result.rows_affected == 0 {
                return Err(AppError::fail("That is an invalid or expired token"));
            }
            Ok(())
        })
    })
    .await
    .map_err(map_tx_error)?;

    info!("password reset completed for user {}", user_id);
    Ok(())
}

/// Verify and consume in one call, for handlers that only hold the token.
pub async fn reset_password(db: &DatabaseConnection, token: &str, new_password: &str) -> Result<(), AppError> {
    let user = verify_token(db, token)
        .await?
        .ok_or_else(|| AppError::fail("That is an invalid or expired token"))?;
    consume_token(db, &user, new_password).await
}

/// Issues a token and mails the link when `email` belongs to an active account.
/// Returns `Ok` either way so callers cannot probe which addresses exist.
pub async fn request_reset<F>(
    db: &DatabaseConnection,
    mailer: &dyn Mailer,
    email: &str,
    ttl_secs: i64,
    link_for: F,
) -> Result<(), AppError>
where
    F: Fn(&str) -> String,
{
    let Some(user) = find_by_email(db, email).await? else {
        info!("reset requested for unknown address");
        return Ok(());
    };
    if !user.is_active {
        return Ok(());
    }
    let token = issue_token(db, user.id, ttl_secs).await?;
    // delivery failures answer like unknown addresses do
    if let Err(e) = mailer.send_reset(&user.email, &link_for(&token)).await {
        warn!("reset mail to user {} failed: {}", user.id, e);
    }
    Ok(())
}
