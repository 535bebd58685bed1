use chrono::Utc;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Select, Set,
};

use super::{check_len, exec_sql, Page};
use crate::auth::Identity;
use crate::entity::post;
use crate::error::{is_unique_violation, AppError};

pub const DEFAULT_CATEGORY: &str = "uncategorized";
const MAX_SLUG_LEN: usize = 100;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern"));

pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub is_published: Option<bool>,
}

/// Lowercased ASCII words joined by `-`. Titles with no usable characters
/// fall back to `post`.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let joined = NON_SLUG.replace_all(&lowered, "-");
    let mut slug: String = joined.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

/// First free slug among `base`, `base-2`, `base-3`, ... ignoring `except`.
async fn unique_slug(db: &DatabaseConnection, base: &str, except: Option<i32>) -> Result<String, AppError> {
    let mut candidate = base.to_string();
    let mut n = 2;
    loop {
        let mut query = post::Entity::find().filter(post::Column::Slug.eq(candidate.as_str()));
        if let Some(id) = except {
            query = query.filter(post::Column::Id.ne(id));
        }
        let taken = query
            .one(db)
            .await
            .map_err(|e| AppError::db("check slug", e))?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
}

fn check_draft(draft: &PostDraft) -> Result<(), AppError> {
    check_len("title", &draft.title, 1, 100)?;
    check_len("content", &draft.content, 1, usize::MAX)?;
    if let Some(category) = &draft.category {
        check_len("category", category, 0, 50)?;
    }
    Ok(())
}

fn category_of(draft: &PostDraft) -> String {
    draft
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string()
}

pub async fn create(db: &DatabaseConnection, author_id: i32, draft: PostDraft) -> Result<post::Model, AppError> {
    check_draft(&draft)?;
    let title = draft.title.trim().to_string();
    let slug = unique_slug(db, &slugify(&title), None).await?;
    let now = Utc::now();

    let model = post::ActiveModel {
        user_id: Set(author_id),
        title: Set(title),
        slug: Set(slug),
        category: Set(category_of(&draft)),
        content: Set(draft.content),
        summary: Set(draft.summary.filter(|s| !s.trim().is_empty())),
        is_published: Set(draft.is_published.unwrap_or(true)),
        view_count: Set(0),
        date_posted: Set(now),
        last_updated: Set(Some(now)),
        ..Default::default()
    };
    let created = model.insert(db).await.map_err(map_slug_conflict)?;
    info!("user {} created post {} ({})", author_id, created.id, created.slug);
    Ok(created)
}

pub async fn find_post(db: &DatabaseConnection, id: i32) -> Result<post::Model, AppError> {
    post::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| AppError::db("find post", e))?
        .ok_or_else(|| AppError::not_found("post"))
}

pub async fn find_by_slug(db: &DatabaseConnection, slug: &str) -> Result<post::Model, AppError> {
    post::Entity::find()
        .filter(post::Column::Slug.eq(slug))
        .one(db)
        .await
        .map_err(|e| AppError::db("find post by slug", e))?
        .ok_or_else(|| AppError::not_found("post"))
}

/// Drafts are only visible to their author and admins; everyone else gets
/// the same answer as for a missing post.
pub fn can_see(post: &post::Model, viewer: Option<&Identity>) -> bool {
    post.is_published
        || viewer
            .map(|v| v.is_admin || v.user_id == post.user_id)
            .unwrap_or(false)
}

/// Reads a post for display and counts the view.
pub async fn view(db: &DatabaseConnection, viewer: Option<&Identity>, id: i32) -> Result<post::Model, AppError> {
    let mut found = find_post(db, id).await?;
    if !can_see(&found, viewer) {
        return Err(AppError::not_found("post"));
    }
    exec_sql(
        db,
        "update t_post set view_count = view_count + 1 where id = ?",
        vec![id.into()],
    )
    .await?;
    found.view_count += 1;
    Ok(found)
}

pub async fn update(
    db: &DatabaseConnection,
    actor: &Identity,
    id: i32,
    draft: PostDraft,
) -> Result<post::Model, AppError> {
    let existing = find_post(db, id).await?;
    if existing.user_id != actor.user_id {
        return Err(AppError::forbidden());
    }
    check_draft(&draft)?;

    let title = draft.title.trim().to_string();
    let slug = if title != existing.title {
        unique_slug(db, &slugify(&title), Some(id)).await?
    } else {
        existing.slug.clone()
    };
    let is_published = draft.is_published.unwrap_or(existing.is_published);

    let mut active: post::ActiveModel = existing.into();
    active.title = Set(title);
    active.slug = Set(slug);
    active.category = Set(category_of(&draft));
    active.content = Set(draft.content);
    active.summary = Set(draft.summary.filter(|s| !s.trim().is_empty()));
    active.is_published = Set(is_published);
    active.last_updated = Set(Some(Utc::now()));
    active.update(db).await.map_err(map_slug_conflict)
}

/// Authors delete their own posts, admins any. Comments and likes cascade.
pub async fn delete(db: &DatabaseConnection, actor: &Identity, id: i32) -> Result<(), AppError> {
    let existing = find_post(db, id).await?;
    if existing.user_id != actor.user_id && !actor.is_admin {
        return Err(AppError::forbidden());
    }
    post::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map_err(|e| AppError::db("delete post", e))?;
    info!("user {} deleted post {}", actor.user_id, id);
    Ok(())
}

/// Published posts, newest first, optionally restricted to one category.
pub async fn list(
    db: &DatabaseConnection,
    category: Option<&str>,
    page: u64,
    size: u64,
) -> Result<Page<post::Model>, AppError> {
    let mut query = post::Entity::find().filter(post::Column::IsPublished.eq(true));
    if let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) {
        query = query.filter(post::Column::Category.eq(category));
    }
    fetch_page(db, query, page, size).await
}

/// An author's published posts, newest first.
pub async fn list_by_author(
    db: &DatabaseConnection,
    author_id: i32,
    page: u64,
    size: u64,
) -> Result<Page<post::Model>, AppError> {
    let query = post::Entity::find()
        .filter(post::Column::UserId.eq(author_id))
        .filter(post::Column::IsPublished.eq(true));
    fetch_page(db, query, page, size).await
}

async fn fetch_page(
    db: &DatabaseConnection,
    query: Select<post::Entity>,
    page: u64,
    size: u64,
) -> Result<Page<post::Model>, AppError> {
    let size = size.max(1);
    let paginator = query
        .order_by_desc(post::Column::DatePosted)
        .order_by_desc(post::Column::Id)
        .paginate(db, size);
    let total = paginator
        .num_items()
        .await
        .map_err(|e| AppError::db("count posts", e))?;
    let items = paginator
        .fetch_page(page.saturating_sub(1))
        .await
        .map_err(|e| AppError::db("list posts", e))?;
    Ok(Page { items, total, page, size })
}

fn map_slug_conflict(err: sea_orm::DbErr) -> AppError {
    if is_unique_violation(&err) {
        return AppError::param_error("title", "A post with a similar title was just created, please retry");
    }
    AppError::db("save post", err)
}
