use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use super::CommentDto;
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::response::{ok, ok_empty};
use crate::service::{comment, post};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/add").route(web::post().to(add)))
        .service(web::resource("/{id}/replies").route(web::get().to(replies)))
        .service(web::resource("/{id}/remove").route(web::post().to(remove)))
        .service(web::resource("/{id}/approve").route(web::post().to(approve)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveCommentRequest {
    post_id: i32,
    content: String,
    parent_id: Option<i32>,
}

#[derive(Deserialize)]
struct ApproveRequest {
    approved: bool,
}

async fn add(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    payload: web::Json<SaveCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    let target = post::find_post(db.get_ref(), payload.post_id).await?;
    if !post::can_see(&target, Some(identity)) {
        return Err(AppError::not_found("post"));
    }
    let created = comment::add_comment(
        db.get_ref(),
        identity.user_id,
        payload.post_id,
        &payload.content,
        payload.parent_id,
    )
    .await?;
    Ok(ok(CommentDto::from(created)))
}

/// Replies follow the visibility of the post they sit on.
async fn replies(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let parent = comment::find_comment(db.get_ref(), path.into_inner()).await?;
    let target = post::find_post(db.get_ref(), parent.post_id).await?;
    if !post::can_see(&target, ctx.identity()) {
        return Err(AppError::not_found("comment"));
    }
    let list = comment::list_replies(db.get_ref(), parent.id, ctx.is_admin()).await?;
    Ok(ok(list.into_iter().map(CommentDto::from).collect::<Vec<_>>()))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let identity = ctx.require_login()?;
    comment::delete_comment(db.get_ref(), identity, path.into_inner()).await?;
    Ok(ok_empty())
}

async fn approve(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
    payload: web::Json<ApproveRequest>,
) -> Result<HttpResponse, AppError> {
    ctx.require_admin()?;
    let updated = comment::set_approved(db.get_ref(), path.into_inner(), payload.approved).await?;
    Ok(ok(CommentDto::from(updated)))
}
