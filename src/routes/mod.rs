pub mod auth;
pub mod comment;
pub mod cors;
pub mod message;
pub mod post;
pub mod user;

use actix_web::web;
use serde::{Deserialize, Serialize};

use crate::entity::{comment as comment_entity, post as post_entity};
use crate::service::Page;
use crate::response::PageDto;

/// Everything mounted under `/api`.
pub fn api(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/auth").configure(auth::config))
        .service(web::scope("/user").configure(user::config))
        .service(web::scope("/post").configure(post::config))
        .service(web::scope("/comment").configure(comment::config))
        .service(web::scope("/message").configure(message::config));
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
}

pub fn page_dto<T, U: Serialize>(page: Page<T>, f: impl FnMut(T) -> U) -> PageDto<U> {
    let page = page.map(f);
    PageDto::new(page.items, page.total, page.page, page.size)
}

fn to_rfc3339(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDto {
    id: i32,
    user_id: i32,
    title: String,
    slug: String,
    content: String,
    summary: Option<String>,
    category: String,
    is_published: bool,
    view_count: i32,
    date_posted: String,
    last_updated: Option<String>,
}

impl From<post_entity::Model> for PostDto {
    fn from(model: post_entity::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            slug: model.slug,
            content: model.content,
            summary: model.summary,
            category: model.category,
            is_published: model.is_published,
            view_count: model.view_count,
            date_posted: to_rfc3339(model.date_posted),
            last_updated: model.last_updated.map(to_rfc3339),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    id: i32,
    post_id: i32,
    user_id: i32,
    parent_id: Option<i32>,
    content: String,
    is_approved: bool,
    date_posted: String,
}

impl From<comment_entity::Model> for CommentDto {
    fn from(model: comment_entity::Model) -> Self {
        Self {
            id: model.id,
            post_id: model.post_id,
            user_id: model.user_id,
            parent_id: model.parent_id,
            content: model.content,
            is_approved: model.is_approved,
            date_posted: to_rfc3339(model.date_posted),
        }
    }
}
