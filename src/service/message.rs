use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set};

use super::{check_email, check_len, Page};
use crate::entity::message;
use crate::error::AppError;

pub const MESSAGES_PER_PAGE: u64 = 20;

pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

pub async fn submit(db: &DatabaseConnection, form: ContactForm) -> Result<message::Model, AppError> {
    check_len("name", &form.name, 1, 100)?;
    check_email("email", &form.email)?;
    check_len("subject", &form.subject, 1, 200)?;
    check_len("message", &form.message, 1, 5000)?;

    let model = message::ActiveModel {
        name: Set(form.name.trim().to_string()),
        email: Set(form.email.trim().to_string()),
        subject: Set(form.subject.trim().to_string()),
        message: Set(form.message),
        date_received: Set(Utc::now()),
        is_read: Set(false),
        ..Default::default()
    };
    model
        .insert(db)
        .await
        .map_err(|e| AppError::db("store message", e))
}

pub async fn list(db: &DatabaseConnection, page: u64) -> Result<Page<message::Model>, AppError> {
    let paginator = message::Entity::find()
        .order_by_desc(message::Column::DateReceived)
        .order_by_desc(message::Column::Id)
        .paginate(db, MESSAGES_PER_PAGE);
    let total = paginator
        .num_items()
        .await
        .map_err(|e| AppError::db("count messages", e))?;
    let items = paginator
        .fetch_page(page.saturating_sub(1))
        .await
        .map_err(|e| AppError::db("list messages", e))?;
    Ok(Page { items, total, page, size: MESSAGES_PER_PAGE })
}

pub async fn mark_read(db: &DatabaseConnection, id: i32) -> Result<message::Model, AppError> {
    let found = message::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| AppError::db("find message", e))?
        .ok_or_else(|| AppError::not_found("message"))?;
    let mut active: message::ActiveModel = found.into();
    active.is_read = Set(true);
    active
        .update(db)
        .await
        .map_err(|e| AppError::db("mark message read", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_db;

    fn form(subject: &str) -> ContactForm {
        ContactForm {
            name: "Visitor".to_string(),
            email: "visitor@example.com".to_string(),
            subject: subject.to_string(),
            message: "Loved the post about lifetimes.".to_string(),
        }
    }

    #[actix_web::test]
    async fn submit_list_and_read() {
        let db = memory_db().await;
        let first = submit(&db, form("Hello")).await.unwrap();
        assert!(!first.is_read);
        let second = submit(&db, form("Again")).await.unwrap();

        let page = list(&db, 1).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, second.id);

        assert!(mark_read(&db, first.id).await.unwrap().is_read);
        assert!(matches!(mark_read(&db, 999).await, Err(AppError::NotFound(_))));
    }

    #[actix_web::test]
    async fn rejects_incomplete_forms() {
        let db = memory_db().await;
        let mut missing = form("");
        assert_eq!(submit(&db, missing).await.unwrap_err().field(), Some("subject"));
        missing = form("Hi");
        missing.email = "nope".to_string();
        assert_eq!(submit(&db, missing).await.unwrap_err().field(), Some("email"));
    }
}
