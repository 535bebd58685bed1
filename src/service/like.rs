use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Serialize;

use super::{post::find_post, Page};
use crate::entity::{post_like, user};
use crate::error::{is_unique_violation, AppError};

pub const LIKES_PER_PAGE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeState {
    Liked,
    Unliked,
}

#[derive(Debug, Clone)]
pub struct Liker {
    pub username: String,
    pub image_file: String,
    pub timestamp: DateTime<Utc>,
}

/// Flips the (user, post) like. Deleting first means whichever of two racing
/// toggles removes the row wins the unlike; an insert that trips the unique
/// index lost a race to another like and reports the state it found.
pub async fn toggle_like(db: &DatabaseConnection, user_id: i32, post_id: i32) -> Result<LikeState, AppError> {
    find_post(db, post_id).await?;

    let removed = post_like::Entity::delete_many()
        .filter(post_like::Column::UserId.eq(user_id))
        .filter(post_like::Column::PostId.eq(post_id))
        .exec(db)
        .await
        .map_err(|e| AppError::db("unlike", e))?;
    if removed.rows_affected > 0 {
        return Ok(LikeState::Unliked);
    }

    let like = post_like::ActiveModel {
        user_id: Set(user_id),
        post_id: Set(post_id),
        timestamp: Set(Utc::now()),
        ..Default::default()
    };
    match like.insert(db).await {
        Ok(_) => Ok(LikeState::Liked),
        Err(e) if is_unique_violation(&e) => Ok(LikeState::Liked),
        Err(e) => Err(AppError::db("like", e)),
    }
}

pub async fn like_count(db: &DatabaseConnection, post_id: i32) -> Result<u64, AppError> {
    post_like::Entity::find()
        .filter(post_like::Column::PostId.eq(post_id))
        .count(db)
        .await
        .map_err(|e| AppError::db("count likes", e))
}

pub async fn is_liked_by(db: &DatabaseConnection, post_id: i32, user_id: i32) -> Result<bool, AppError> {
    let found = post_like::Entity::find()
        .filter(post_like::Column::PostId.eq(post_id))
        .filter(post_like::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(|e| AppError::db("find like", e))?;
    Ok(found.is_some())
}

/// Most recent likers first.
pub async fn list_likes(db: &DatabaseConnection, post_id: i32, page: u64) -> Result<Page<Liker>, AppError> {
    find_post(db, post_id).await?;
    let paginator = post_like::Entity::find()
        .filter(post_like::Column::PostId.eq(post_id))
        .order_by_desc(post_like::Column::Timestamp)
        .order_by_desc(post_like::Column::Id)
        .paginate(db, LIKES_PER_PAGE);
    let total = paginator
        .num_items()
        .await
        .map_err(|e| AppError::db("count likes", e))?;
    let likes = paginator
        .fetch_page(page.saturating_sub(1))
        .await
        .map_err(|e| AppError::db("list likes", e))?;

    let ids: Vec<i32> = likes.iter().map(|l| l.user_id).collect();
    let users: HashMap<i32, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await
        .map_err(|e| AppError::db("load likers", e))?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let items = likes
        .into_iter()
        .filter_map(|like| {
            users.get(&like.user_id).map(|u| Liker {
                username: u.username.clone(),
                image_file: u.image_file.clone(),
                timestamp: like.timestamp,
            })
        })
        .collect();

    Ok(Page { items, total, page, size: LIKES_PER_PAGE })
}
