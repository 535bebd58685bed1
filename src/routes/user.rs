use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use super::{page_dto, to_rfc3339, CommentDto, PageQuery, PostDto};
use crate::auth::RequestContext;
use crate::avatar;
use crate::config::AppConfig;
use crate::entity::user;
use crate::error::AppError;
use crate::response::{ok, ok_empty};
use crate::service::{account, comment, normalize_page, post, settings};

const PROFILE_POSTS_PER_PAGE: u64 = 10;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/current").route(web::post().to(current_user)))
        .service(
            web::resource("/settings/notifications")
                .route(web::get().to(get_notifications))
                .route(web::post().to(save_notifications)),
        )
        .service(
            web::resource("/settings/privacy")
                .route(web::get().to(get_privacy))
                .route(web::post().to(save_privacy)),
        )
        .service(web::resource("/{username}").route(web::get().to(profile)))
        .service(web::resource("/{username}/posts").route(web::get().to(user_posts)))
        .service(web::resource("/{username}/comments").route(web::get().to(user_comments)))
        .service(web::resource("/{username}/edit").route(web::post().to(edit_profile)))
        .service(web::resource("/{username}/changePassword").route(web::post().to(change_password)))
        .service(web::resource("/{username}/delete").route(web::post().to(delete_account)))
        .service(web::resource("/{username}/avatar").route(web::post().to(upload_avatar)));
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDto {
    id: i32,
    username: String,
    email: Option<String>,
    about_me: Option<String>,
    location: Option<String>,
    website: Option<String>,
    image_file: String,
    is_admin: bool,
    member_since: Option<String>,
    last_seen: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditProfileRequest {
    username: String,
    email: String,
    about_me: Option<String>,
    location: Option<String>,
    website: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAccountRequest {
    confirm_username: String,
    confirm: bool,
}

/// Privacy settings decide what strangers see; owners and admins see everything.
fn to_profile_dto(model: user::Model, privacy: &settings::PrivacySettings, full: bool) -> ProfileDto {
    ProfileDto {
        id: model.id,
        email: (full || privacy.show_email).then_some(model.email),
        last_seen: if full || privacy.show_last_seen { model.last_seen.map(to_rfc3339) } else { None },
        username: model.username,
        about_me: model.about_me,
        location: model.location,
        website: model.website,
        image_file: model.image_file,
        is_admin: model.is_admin,
        member_since: model.member_since.map(to_rfc3339),
    }
}

async fn current_user(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let model = account::find_by_id(db.get_ref(), identity.user_id).await?;
    let privacy = settings::privacy_of(&settings::load(db.get_ref(), model.id).await?);
    Ok(ok(to_profile_dto(model, &privacy, true)))
}

async fn profile(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let model = account::find_by_username(db.get_ref(), &path).await?;
    let is_self = ctx.identity().map(|i| i.user_id == model.id).unwrap_or(false);
    if is_self {
        account::touch_last_seen(db.get_ref(), model.id).await?;
    }
    let privacy = settings::privacy_of(&settings::load(db.get_ref(), model.id).await?);
    Ok(ok(to_profile_dto(model, &privacy, is_self || ctx.is_admin())))
}

async fn user_posts(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let model = account::find_by_username(db.get_ref(), &path).await?;
    let page = post::list_by_author(
        db.get_ref(),
        model.id,
        normalize_page(query.page),
        PROFILE_POSTS_PER_PAGE,
    )
    .await?;
    Ok(ok(page_dto(page, PostDto::from)))
}

async fn user_comments(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let model = account::find_by_username(db.get_ref(), &path).await?;
    let page = comment::list_by_user(db.get_ref(), model.id, normalize_page(query.page)).await?;
    Ok(ok(page_dto(page, CommentDto::from)))
}

async fn edit_profile(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<String>,
    payload: web::Json<EditProfileRequest>,
) -> Result<HttpResponse, AppError> {
    ctx.require_self_or_admin(&path)?;
    let model = account::find_by_username(db.get_ref(), &path).await?;
    let payload = payload.into_inner();
    let updated = account::update_profile(
        db.get_ref(),
        &model,
        account::ProfileEdit {
            username: payload.username,
            email: payload.email,
            about_me: payload.about_me,
            location: payload.location,
            website: payload.website,
        },
    )
    .await?;
    let privacy = settings::privacy_of(&settings::load(db.get_ref(), updated.id).await?);
    Ok(ok(to_profile_dto(updated, &privacy, true)))
}

async fn change_password(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<String>,
    payload: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    ctx.require_self_or_admin(&path)?;
    if payload.new_password != payload.confirm_password {
        return Err(AppError::param_error("confirm_password", "Passwords must match"));
    }
    let model = account::find_by_username(db.get_ref(), &path).await?;
    account::change_password(db.get_ref(), &model, &payload.current_password, &payload.new_password).await?;
    Ok(ok_empty())
}

async fn delete_account(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    ctx: RequestContext,
    path: web::Path<String>,
    payload: web::Json<DeleteAccountRequest>,
) -> Result<HttpResponse, AppError> {
    ctx.require_self_or_admin(&path)?;
    if !payload.confirm || payload.confirm_username != *path {
        return Err(AppError::param_error(
            "confirm_username",
            "Please enter your username and confirm to delete the account",
        ));
    }
    let model = account::find_by_username(db.get_ref(), &path).await?;
    let removed = account::delete_account(db.get_ref(), model.id).await?;
    avatar::remove(&config.avatar_dir(), &removed.image_file).await;
    Ok(ok_empty())
}

/// Takes the first file field of the multipart body as the new picture.
async fn upload_avatar(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    ctx: RequestContext,
    path: web::Path<String>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    ctx.require_self_or_admin(&path)?;
    let model = account::find_by_username(db.get_ref(), &path).await?;

    let mut field = match payload.next().await {
        Some(Ok(field)) => field,
        Some(Err(_)) => return Err(AppError::fail("upload failed")),
        None => return Err(AppError::param_error("picture", "No picture uploaded")),
    };

    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|_| AppError::fail("upload failed"))?;
        if bytes.len() + data.len() > config.max_avatar_bytes {
            return Err(AppError::param_error("picture", "Picture is too large"));
        }
        bytes.extend_from_slice(&data);
    }

    let dir = config.avatar_dir();
    let name = avatar::save(&dir, &bytes).await?;
    let previous = match account::set_avatar(db.get_ref(), model.id, &name).await {
        Ok(previous) => previous,
        Err(e) => {
            avatar::remove(&dir, &name).await;
            return Err(e);
        }
    };
    avatar::remove(&dir, &previous).await;
    Ok(ok(name))
}

async fn get_notifications(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let stored = settings::load(db.get_ref(), identity.user_id).await?;
    Ok(ok(settings::notifications_of(&stored)))
}

async fn save_notifications(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    payload: web::Json<settings::NotificationSettings>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let saved = settings::save_notifications(db.get_ref(), identity.user_id, payload.into_inner()).await?;
    Ok(ok(saved))
}

async fn get_privacy(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let stored = settings::load(db.get_ref(), identity.user_id).await?;
    Ok(ok(settings::privacy_of(&stored)))
}

async fn save_privacy(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    payload: web::Json<settings::PrivacySettings>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let saved = settings::save_privacy(db.get_ref(), identity.user_id, payload.into_inner()).await?;
    Ok(ok(saved))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    use crate::auth::issue_session_token;
    use crate::avatar::testing::PNG_HEADER;
    use crate::config::AppConfig;
    use crate::db::testing::{memory_db, register};
    use crate::mailer::testing::RecordingMailer;
    use crate::routes::testing::app;

    #[actix_web::test]
    async fn profile_respects_privacy_and_ownership() {
        let db = memory_db().await;
        let config = AppConfig::for_tests();
        let alice = register(&db, "alice").await;
        let bob = register(&db, "bob").await;
        let alice_token = issue_session_token(&config, alice.id).unwrap();
        let bob_token = issue_session_token(&config, bob.id).unwrap();
        let srv = test::init_service(app(db, config, Arc::new(RecordingMailer::default()))).await;

        let req = test::TestRequest::get().uri("/api/user/alice").to_request();
        let body: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(body["data"]["username"], "alice");
        assert!(body["data"]["email"].is_null());

        let req = test::TestRequest::get()
            .uri("/api/user/alice")
            .insert_header(("token", alice_token.clone()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(body["data"]["email"], "alice@example.com");

        let req = test::TestRequest::post()
            .uri("/api/user/alice/edit")
            .insert_header(("token", bob_token))
            .set_json(json!({"username": "mallory", "email": "m@x.com"}))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/user/alice/edit")
            .set_json(json!({"username": "mallory", "email": "m@x.com"}))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/user/settings/privacy")
            .insert_header(("token", alice_token))
            .set_json(json!({"showEmail": true, "showLastSeen": true, "allowSearchEngines": false}))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/user/alice").to_request();
        let body: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(body["data"]["email"], "alice@example.com");

        let req = test::TestRequest::get().uri("/api/user/nobody").to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn avatar_upload_records_filename() {
        let db = memory_db().await;
        let mut config = AppConfig::for_tests();
        config.upload_storage_path = std::env::temp_dir()
            .join(format!("folio-upload-{}", std::process::id()))
            .to_string_lossy()
            .to_string();
        let alice = register(&db, "alice").await;
        let token = issue_session_token(&config, alice.id).unwrap();
        let avatar_dir = config.avatar_dir();
        let srv = test::init_service(app(db.clone(), config, Arc::new(RecordingMailer::default()))).await;

        let boundary = "XBOUNDARYX";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"picture\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n",
            b = boundary
        )
        .into_bytes();
        body.extend_from_slice(&PNG_HEADER);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let req = test::TestRequest::post()
            .uri("/api/user/alice/avatar")
            .insert_header(("token", token))
            .insert_header(("content-type", format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(body)
            .to_request();
        let resp: Value = test::call_and_read_body_json(&srv, req).await;
        let name = resp["data"].as_str().unwrap().to_string();
        assert!(name.ends_with(".png"));
        assert!(avatar_dir.join(&name).exists());

        let stored = crate::service::account::find_by_id(&db, alice.id).await.unwrap();
        assert_eq!(stored.image_file, name);
        let _ = std::fs::remove_dir_all(avatar_dir);
    }

    #[actix_web::test]
    async fn delete_account_needs_confirmation() {
        let db = memory_db().await;
        let config = AppConfig::for_tests();
        let alice = register(&db, "alice").await;
        let token = issue_session_token(&config, alice.id).unwrap();
        let srv = test::init_service(app(db.clone(), config, Arc::new(RecordingMailer::default()))).await;

        let req = test::TestRequest::post()
            .uri("/api/user/alice/delete")
            .insert_header(("token", token.clone()))
            .set_json(json!({"confirmUsername": "alice", "confirm": false}))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/user/alice/delete")
            .insert_header(("token", token.clone()))
            .set_json(json!({"confirmUsername": "alice", "confirm": true}))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // the session of a deleted account no longer authenticates
        let req = test::TestRequest::post()
            .uri("/api/user/current")
            .insert_header(("token", token))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
