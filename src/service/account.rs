use chrono::Utc;
use log::info;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use super::{check_email, check_len};
use crate::entity::user;
use crate::error::{is_unique_violation, AppError};
use crate::password::{hash_password, verify_password};

pub const MIN_PASSWORD_LEN: usize = 8;
const LOGIN_FAILED: &str = "Login unsuccessful. Please check email and password";

pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub struct ProfileEdit {
    pub username: String,
    pub email: String,
    pub about_me: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

/// Literal segments under `/api/user/` that a `{username}` path would shadow.
const RESERVED_USERNAMES: [&str; 2] = ["current", "settings"];

pub fn check_username(username: &str) -> Result<(), AppError> {
    check_len("username", username, 3, 20)?;
    if RESERVED_USERNAMES.iter().any(|r| r.eq_ignore_ascii_case(username)) {
        return Err(AppError::param_error("username", "That username is not available."));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(AppError::param_error(
            "username",
            "Username may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(())
}

pub fn check_new_password(field: &str, password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::param_error(
            field,
            format!("Password must be at least {} characters long", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

pub async fn register(db: &DatabaseConnection, reg: Registration) -> Result<user::Model, AppError> {
    let username = reg.username.trim().to_string();
    let email = reg.email.trim().to_lowercase();
    check_username(&username)?;
    check_email("email", &email)?;
    check_new_password("password", &reg.password)?;

    ensure_username_free(db, &username, None).await?;
    ensure_email_free(db, &email, None).await?;

    let now = Utc::now();
    let model = user::ActiveModel {
        username: Set(username),
        email: Set(email),
        password_hash: Set(Some(hash_password(&reg.password)?)),
        is_admin: Set(false),
        is_active: Set(true),
        image_file: Set(user::DEFAULT_AVATAR.to_string()),
        member_since: Set(Some(now)),
        last_seen: Set(Some(now)),
        ..Default::default()
    };

    let created = model.insert(db).await.map_err(map_identity_conflict)?;
    info!("registered user {} ({})", created.username, created.id);
    Ok(created)
}

/// Logs in by email, or by username when the input has no `@`. Failures all read
/// the same and nothing is counted, so there is no lockout.
pub async fn authenticate(
    db: &DatabaseConnection,
    login: &str,
    password: &str,
) -> Result<user::Model, AppError> {
    let login = login.trim();
    let found = if login.contains('@') {
        find_by_email(db, login).await?
    } else {
        find_by_username_opt(db, login).await?
    };

    let user = match found {
        Some(user) if user.is_active => user,
        _ => return Err(AppError::fail(LOGIN_FAILED)),
    };
    if !verify_password(password, user.password_hash.as_deref()) {
        return Err(AppError::fail(LOGIN_FAILED));
    }

    touch_last_seen(db, user.id).await?;
    Ok(user)
}

pub async fn find_by_id(db: &DatabaseConnection, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| AppError::db("find user by id", e))?
        .ok_or_else(|| AppError::not_found("user"))
}

pub async fn find_by_username(db: &DatabaseConnection, username: &str) -> Result<user::Model, AppError> {
    find_by_username_opt(db, username)
        .await?
        .ok_or_else(|| AppError::not_found("user"))
}

async fn find_by_username_opt(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<user::Model>, AppError> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
        .map_err(|e| AppError::db("find user by username", e))
}

pub async fn find_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<user::Model>, AppError> {
    user::Entity::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await
        .map_err(|e| AppError::db("find user by email", e))
}

/// Stores a fresh hash for `raw`; any previous password stops verifying.
pub async fn set_password<C: ConnectionTrait>(db: &C, user_id: i32, raw: &str) -> Result<(), AppError> {
    let active = user::ActiveModel {
        id: Set(user_id),
        password_hash: Set(Some(hash_password(raw)?)),
        ..Default::default()
    };
    user::Entity::update(active)
        .exec(db)
        .await
        .map_err(|e| AppError::db("set password", e))?;
    Ok(())
}

pub async fn change_password(
    db: &DatabaseConnection,
    user: &user::Model,
    current: &str,
    new_password: &str,
) -> Result<(), AppError> {
    if !verify_password(current, user.password_hash.as_deref()) {
        return Err(AppError::param_error("current_password", "Current password is incorrect."));
    }
    check_new_password("new_password", new_password)?;
    set_password(db, user.id, new_password).await?;
    info!("password changed for user {}", user.id);
    Ok(())
}

pub async fn update_profile(
    db: &DatabaseConnection,
    user: &user::Model,
    edit: ProfileEdit,
) -> Result<user::Model, AppError> {
    let username = edit.username.trim().to_string();
    let email = edit.email.trim().to_lowercase();
    check_username(&username)?;
    check_email("email", &email)?;
    let about_me = optional_text("about_me", edit.about_me, 500)?;
    let location = optional_text("location", edit.location, 100)?;
    let website = optional_text("website", edit.website, 200)?;

    if username != user.username {
        ensure_username_free(db, &username, Some(user.id)).await?;
    }
    if email != user.email {
        ensure_email_free(db, &email, Some(user.id)).await?;
    }

    let mut active: user::ActiveModel = user.clone().into();
    active.username = Set(username);
    active.email = Set(email);
    active.about_me = Set(about_me);
    active.location = Set(location);
    active.website = Set(website);
    active.update(db).await.map_err(map_identity_conflict)
}

/// Records the stored avatar filename and returns the one it replaced.
pub async fn set_avatar(db: &DatabaseConnection, user_id: i32, file_name: &str) -> Result<String, AppError> {
    let user = find_by_id(db, user_id).await?;
    let previous = user.image_file.clone();
    let mut active: user::ActiveModel = user.into();
    active.image_file = Set(file_name.to_string());
    active
        .update(db)
        .await
        .map_err(|e| AppError::db("set avatar", e))?;
    Ok(previous)
}

pub async fn touch_last_seen(db: &DatabaseConnection, user_id: i32) -> Result<(), AppError> {
    let active = user::ActiveModel {
        id: Set(user_id),
        last_seen: Set(Some(Utc::now())),
        ..Default::default()
    };
    user::Entity::update(active)
        .exec(db)
        .await
        .map_err(|e| AppError::db("touch last_seen", e))?;
    Ok(())
}

/// Removes the account; posts, comments, likes and settings go with it through
/// the schema's cascading foreign keys.
pub async fn delete_account(db: &DatabaseConnection, user_id: i32) -> Result<user::Model, AppError> {
    let user = find_by_id(db, user_id).await?;
    user::Entity::delete_by_id(user_id)
        .exec(db)
        .await
        .map_err(|e| AppError::db("delete user", e))?;
    info!("deleted account {} ({})", user.username, user.id);
    Ok(user)
}

async fn ensure_username_free(db: &DatabaseConnection, username: &str, except: Option<i32>) -> Result<(), AppError> {
    if let Some(existing) = find_by_username_opt(db, username).await? {
        if Some(existing.id) != except {
            return Err(AppError::param_error(
                "username",
                "That username is already taken. Please choose a different one.",
            ));
        }
    }
    Ok(())
}

async fn ensure_email_free(db: &DatabaseConnection, email: &str, except: Option<i32>) -> Result<(), AppError> {
    if let Some(existing) = find_by_email(db, email).await? {
        if Some(existing.id) != except {
            return Err(AppError::param_error(
                "email",
                "That email is already registered. Please use a different one.",
            ));
        }
    }
    Ok(())
}

/// The pre-checks race with concurrent registrations; the unique index has the last word.
fn map_identity_conflict(err: sea_orm::DbErr) -> AppError {
    if is_unique_violation(&err) {
        let msg = err.to_string();
        if msg.contains("email") {
            return AppError::param_error("email", "That email is already registered. Please use a different one.");
        }
        return AppError::param_error("username", "That username is already taken. Please choose a different one.");
    }
    AppError::db("save user", err)
}

fn optional_text(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, AppError> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => {
            check_len(field, &v, 0, max)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{memory_db, publish, register as register_user};
    use crate::entity::{comment, post, post_like};
    use crate::service::{comment as comment_service, like};
    use sea_orm::PaginatorTrait;

    #[test]
    fn route_segments_are_not_usernames() {
        assert!(check_username("current").is_err());
        assert!(check_username("Settings").is_err());
        assert!(check_username("currently").is_ok());
    }

    fn alice() -> Registration {
        Registration {
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password: "Secret123".to_string(),
        }
    }

    #[actix_web::test]
    async fn register_then_login() {
        let db = memory_db().await;
        let user = register(&db, alice()).await.unwrap();
        assert_eq!(user.username, "alice");
        assert!(!user.is_admin);
        assert!(user.is_active);
        assert_eq!(user.image_file, user::DEFAULT_AVATAR);
        assert!(user.reset_token.is_none() && user.reset_token_expiry.is_none());
        assert_ne!(user.password_hash.as_deref(), Some("Secret123"));

        let logged_in = authenticate(&db, "a@x.com", "Secret123").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        let by_name = authenticate(&db, "alice", "Secret123").await.unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[actix_web::test]
    async fn wrong_password_never_locks_out() {
        let db = memory_db().await;
        register(&db, alice()).await.unwrap();
        for _ in 0..5 {
            let err = authenticate(&db, "a@x.com", "wrong-password").await.unwrap_err();
            assert!(matches!(err, AppError::Fail(_)));
        }
        assert!(authenticate(&db, "a@x.com", "Secret123").await.is_ok());
    }

    #[actix_web::test]
    async fn unknown_login_reads_like_wrong_password() {
        let db = memory_db().await;
        register(&db, alice()).await.unwrap();
        let unknown = authenticate(&db, "nobody@x.com", "Secret123").await.unwrap_err();
        let wrong = authenticate(&db, "a@x.com", "Secret124").await.unwrap_err();
        assert_eq!(unknown.msg(), wrong.msg());
    }

    #[actix_web::test]
    async fn duplicate_username_and_email_are_field_errors() {
        let db = memory_db().await;
        register(&db, alice()).await.unwrap();

        let mut dup_name = alice();
        dup_name.email = "other@x.com".to_string();
        let err = register(&db, dup_name).await.unwrap_err();
        assert_eq!(err.field(), Some("username"));

        let mut dup_email = alice();
        dup_email.username = "alice2".to_string();
        dup_email.email = "A@X.com".to_string();
        let err = register(&db, dup_email).await.unwrap_err();
        assert_eq!(err.field(), Some("email"));
    }

    #[actix_web::test]
    async fn registration_validates_fields() {
        let db = memory_db().await;
        let mut short = alice();
        short.username = "al".to_string();
        assert_eq!(register(&db, short).await.unwrap_err().field(), Some("username"));

        let mut weak = alice();
        weak.password = "short".to_string();
        assert_eq!(register(&db, weak).await.unwrap_err().field(), Some("password"));

        let mut bad_mail = alice();
        bad_mail.email = "not-an-email".to_string();
        assert_eq!(register(&db, bad_mail).await.unwrap_err().field(), Some("email"));
    }

    #[actix_web::test]
    async fn inactive_user_cannot_login() {
        let db = memory_db().await;
        let user = register(&db, alice()).await.unwrap();
        let mut active: user::ActiveModel = user.into();
        active.is_active = Set(false);
        active.update(&db).await.unwrap();
        assert!(authenticate(&db, "a@x.com", "Secret123").await.is_err());
    }

    #[actix_web::test]
    async fn change_password_requires_current() {
        let db = memory_db().await;
        let user = register(&db, alice()).await.unwrap();

        let err = change_password(&db, &user, "nope", "NewSecret456").await.unwrap_err();
        assert_eq!(err.field(), Some("current_password"));

        change_password(&db, &user, "Secret123", "NewSecret456").await.unwrap();
        assert!(authenticate(&db, "alice", "Secret123").await.is_err());
        assert!(authenticate(&db, "alice", "NewSecret456").await.is_ok());
    }

    #[actix_web::test]
    async fn profile_edit_checks_uniqueness_against_others_only() {
        let db = memory_db().await;
        let alice = register(&db, alice()).await.unwrap();
        register_user(&db, "bob").await;

        let same = update_profile(
            &db,
            &alice,
            ProfileEdit {
                username: "alice".to_string(),
                email: "a@x.com".to_string(),
                about_me: Some("  writes about rust  ".to_string()),
                location: Some("".to_string()),
                website: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(same.about_me.as_deref(), Some("writes about rust"));
        assert_eq!(same.location, None);

        let err = update_profile(
            &db,
            &same,
            ProfileEdit {
                username: "bob".to_string(),
                email: "a@x.com".to_string(),
                about_me: None,
                location: None,
                website: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.field(), Some("username"));

        let err = update_profile(
            &db,
            &same,
            ProfileEdit {
                username: "alice".to_string(),
                email: "a@x.com".to_string(),
                about_me: Some("x".repeat(501)),
                location: None,
                website: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.field(), Some("about_me"));
    }

    #[actix_web::test]
    async fn set_avatar_returns_previous() {
        let db = memory_db().await;
        let user = register(&db, alice()).await.unwrap();
        let previous = set_avatar(&db, user.id, "0123456789abcdef.png").await.unwrap();
        assert_eq!(previous, user::DEFAULT_AVATAR);
        let previous = set_avatar(&db, user.id, "fedcba9876543210.jpg").await.unwrap();
        assert_eq!(previous, "0123456789abcdef.png");
    }

    #[actix_web::test]
    async fn deleting_account_cascades() {
        let db = memory_db().await;
        let alice = register(&db, alice()).await.unwrap();
        let bob = register_user(&db, "bob").await;
        let alices_post = publish(&db, &alice, "Hello").await;
        let bobs_post = publish(&db, &bob, "Other").await;

        like::toggle_like(&db, alice.id, bobs_post.id).await.unwrap();
        comment_service::add_comment(&db, alice.id, bobs_post.id, "nice", None).await.unwrap();
        comment_service::add_comment(&db, bob.id, alices_post.id, "thanks", None).await.unwrap();

        delete_account(&db, alice.id).await.unwrap();

        assert!(post::Entity::find_by_id(alices_post.id).one(&db).await.unwrap().is_none());
        assert_eq!(post_like::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(comment::Entity::find().count(&db).await.unwrap(), 0);
        assert!(post::Entity::find_by_id(bobs_post.id).one(&db).await.unwrap().is_some());
    }
}
