use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use super::{page_dto, to_rfc3339, CommentDto, PageQuery, PostDto};
use crate::auth::RequestContext;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::response::{ok, ok_empty};
use crate::service::{comment, like, normalize_page, post};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/list").route(web::get().to(list_posts)))
        .service(web::resource("/add").route(web::post().to(add_post)))
        .service(web::resource("/slug/{slug}").route(web::get().to(get_post_by_slug)))
        .service(web::resource("/{id}").route(web::get().to(get_post)))
        .service(web::resource("/{id}/update").route(web::post().to(update_post)))
        .service(web::resource("/{id}/delete").route(web::post().to(delete_post)))
        .service(web::resource("/{id}/like").route(web::post().to(toggle_like)))
        .service(web::resource("/{id}/likes").route(web::get().to(list_likes)))
        .service(web::resource("/{id}/comments").route(web::get().to(list_comments)));
}

#[derive(Deserialize)]
struct ListPostQuery {
    page: Option<u64>,
    category: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavePostRequest {
    title: String,
    content: String,
    summary: Option<String>,
    category: Option<String>,
    is_published: Option<bool>,
}

impl From<SavePostRequest> for post::PostDraft {
    fn from(req: SavePostRequest) -> Self {
        post::PostDraft {
            title: req.title,
            content: req.content,
            summary: req.summary,
            category: req.category,
            is_published: req.is_published,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostDetail {
    #[serde(flatten)]
    post: PostDto,
    like_count: u64,
    liked_by_me: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeResult {
    state: like::LikeState,
    like_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LikerDto {
    username: String,
    image_file: String,
    timestamp: String,
}

async fn list_posts(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    query: web::Query<ListPostQuery>,
) -> Result<HttpResponse, AppError> {
    let page = post::list(
        db.get_ref(),
        query.category.as_deref(),
        normalize_page(query.page),
        config.posts_per_page,
    )
    .await?;
    Ok(ok(page_dto(page, PostDto::from)))
}

async fn get_post(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    detail(db.get_ref(), &ctx, path.into_inner()).await
}

async fn get_post_by_slug(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let found = post::find_by_slug(db.get_ref(), &path).await?;
    detail(db.get_ref(), &ctx, found.id).await
}

async fn detail(db: &DatabaseConnection, ctx: &RequestContext, id: i32) -> Result<HttpResponse, AppError> {
    let found = post::view(db, ctx.identity(), id).await?;
    let like_count = like::like_count(db, id).await?;
    let liked_by_me = match ctx.identity() {
        Some(identity) => like::is_liked_by(db, id, identity.user_id).await?,
        None => false,
    };
    Ok(ok(PostDetail {
        post: PostDto::from(found),
        like_count,
        liked_by_me,
    }))
}

async fn add_post(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    payload: web::Json<SavePostRequest>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let created = post::create(db.get_ref(), identity.user_id, payload.into_inner().into()).await?;
    Ok(ok(PostDto::from(created)))
}

async fn update_post(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
    payload: web::Json<SavePostRequest>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let updated = post::update(db.get_ref(), identity, path.into_inner(), payload.into_inner().into()).await?;
    Ok(ok(PostDto::from(updated)))
}

async fn delete_post(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    post::delete(db.get_ref(), identity, path.into_inner()).await?;
    Ok(ok_empty())
}

async fn toggle_like(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let id = path.into_inner();
    let found = post::find_post(db.get_ref(), id).await?;
    if !post::can_see(&found, Some(identity)) {
        return Err(AppError::not_found("post"));
    }
    let state = like::toggle_like(db.get_ref(), identity.user_id, id).await?;
    let like_count = like::like_count(db.get_ref(), id).await?;
    Ok(ok(LikeResult { state, like_count }))
}

async fn list_likes(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let found = post::find_post(db.get_ref(), id).await?;
    if !post::can_see(&found, ctx.identity()) {
        return Err(AppError::not_found("post"));
    }
    let page = like::list_likes(db.get_ref(), id, normalize_page(query.page)).await?;
    Ok(ok(page_dto(page, |liker| LikerDto {
        username: liker.username,
        image_file: liker.image_file,
        timestamp: to_rfc3339(liker.timestamp),
    })))
}

/// Top-level comments; admins also see the ones awaiting approval.
async fn list_comments(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let found = post::find_post(db.get_ref(), id).await?;
    if !post::can_see(&found, ctx.identity()) {
        return Err(AppError::not_found("post"));
    }
    let page = comment::list_for_post(db.get_ref(), id, ctx.is_admin(), normalize_page(query.page)).await?;
    Ok(ok(page_dto(page, CommentDto::from)))
}
