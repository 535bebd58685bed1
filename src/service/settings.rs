use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};

use crate::entity::user_settings;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email_notifications: bool,
    pub comment_notifications: bool,
    pub reply_notifications: bool,
    pub newsletter: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    pub show_email: bool,
    pub show_last_seen: bool,
    pub allow_search_engines: bool,
}

fn defaults(user_id: i32) -> user_settings::Model {
    user_settings::Model {
        user_id,
        email_notifications: true,
        comment_notifications: true,
        reply_notifications: true,
        newsletter: true,
        show_email: false,
        show_last_seen: true,
        allow_search_engines: true,
    }
}

/// Users without a stored row get the defaults; nothing is written until they save.
pub async fn load(db: &DatabaseConnection, user_id: i32) -> Result<user_settings::Model, AppError> {
    let found = user_settings::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(|e| AppError::db("load settings", e))?;
    Ok(found.unwrap_or_else(|| defaults(user_id)))
}

pub fn notifications_of(model: &user_settings::Model) -> NotificationSettings {
    NotificationSettings {
        email_notifications: model.email_notifications,
        comment_notifications: model.comment_notifications,
        reply_notifications: model.reply_notifications,
        newsletter: model.newsletter,
    }
}

pub fn privacy_of(model: &user_settings::Model) -> PrivacySettings {
    PrivacySettings {
        show_email: model.show_email,
        show_last_seen: model.show_last_seen,
        allow_search_engines: model.allow_search_engines,
    }
}

pub async fn save_notifications(
    db: &DatabaseConnection,
    user_id: i32,
    value: NotificationSettings,
) -> Result<NotificationSettings, AppError> {
    let mut model = load(db, user_id).await?;
    model.email_notifications = value.email_notifications;
    model.comment_notifications = value.comment_notifications;
    model.reply_notifications = value.reply_notifications;
    model.newsletter = value.newsletter;
    let saved = store(db, model).await?;
    Ok(notifications_of(&saved))
}

pub async fn save_privacy(
    db: &DatabaseConnection,
    user_id: i32,
    value: PrivacySettings,
) -> Result<PrivacySettings, AppError> {
    let mut model = load(db, user_id).await?;
    model.show_email = value.show_email;
    model.show_last_seen = value.show_last_seen;
    model.allow_search_engines = value.allow_search_engines;
    let saved = store(db, model).await?;
    Ok(privacy_of(&saved))
}

async fn store(db: &DatabaseConnection, model: user_settings::Model) -> Result<user_settings::Model, AppError> {
    let exists = user_settings::Entity::find_by_id(model.user_id)
        .one(db)
        .await
        .map_err(|e| AppError::db("load settings", e))?
        .is_some();
    let active = user_settings::ActiveModel {
        user_id: Set(model.user_id),
        email_notifications: Set(model.email_notifications),
        comment_notifications: Set(model.comment_notifications),
        reply_notifications: Set(model.reply_notifications),
        newsletter: Set(model.newsletter),
        show_email: Set(model.show_email),
        show_last_seen: Set(model.show_last_seen),
        allow_search_engines: Set(model.allow_search_engines),
    };
    let saved = if exists { active.update(db).await } else { active.insert(db).await };
    saved.map_err(|e| AppError::db("save settings", e))
}
