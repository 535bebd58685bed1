use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use super::{page_dto, to_rfc3339, PageQuery};
use crate::auth::RequestContext;
use crate::entity::message;
use crate::error::AppError;
use crate::response::{ok, ok_empty};
use crate::service::{message as message_service, normalize_page};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/contact").route(web::post().to(contact)))
        .service(web::resource("/list").route(web::get().to(list)))
        .service(web::resource("/{id}/read").route(web::post().to(mark_read)));
}

#[derive(Deserialize)]
struct ContactRequest {
    name: String,
    email: String,
    subject: String,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageDto {
    id: i32,
    name: String,
    email: String,
    subject: String,
    message: String,
    date_received: String,
    is_read: bool,
}

impl From<message::Model> for MessageDto {
    fn from(model: message::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            subject: model.subject,
            message: model.message,
            date_received: to_rfc3339(model.date_received),
            is_read: model.is_read,
        }
    }
}

/// Open to anonymous visitors.
async fn contact(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<ContactRequest>,
) -> Result<HttpResponse, AppError> {
    let payload = payload.into_inner();
    message_service::submit(
        db.get_ref(),
        message_service::ContactForm {
            name: payload.name,
            email: payload.email,
            subject: payload.subject,
            message: payload.message,
        },
    )
    .await?;
    Ok(ok_empty())
}

async fn list(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    ctx.require_admin()?;
    let page = message_service::list(db.get_ref(), normalize_page(query.page)).await?;
    Ok(ok(page_dto(page, MessageDto::from)))
}

async fn mark_read(
    db: web::Data<DatabaseConnection>,
    ctx: RequestContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    ctx.require_admin()?;
    let updated = message_service::mark_read(db.get_ref(), path.into_inner()).await?;
    Ok(ok(MessageDto::from(updated)))
}
