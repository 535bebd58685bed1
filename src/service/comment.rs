use chrono::Utc;
use log::info;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Select, Set, TransactionTrait,
};

use super::{check_len, post::find_post, Page};
use crate::auth::Identity;
use crate::entity::comment;
use crate::error::{map_tx_error, AppError};

pub const MAX_COMMENT_LEN: usize = 1000;
pub const COMMENTS_PER_PAGE: u64 = 10;

pub async fn find_comment(db: &DatabaseConnection, id: i32) -> Result<comment::Model, AppError> {
    comment::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| AppError::db("find comment", e))?
        .ok_or_else(|| AppError::not_found("comment"))
}

/// New comments start approved. A reply's parent has to exist already and sit
/// on the same post, so threads cannot cross posts or form cycles.
pub async fn add_comment(
    db: &DatabaseConnection,
    user_id: i32,
    post_id: i32,
    body: &str,
    parent_id: Option<i32>,
) -> Result<comment::Model, AppError> {
    check_len("content", body, 1, MAX_COMMENT_LEN)?;
    find_post(db, post_id).await?;

    if let Some(parent_id) = parent_id {
        let parent = comment::Entity::find_by_id(parent_id)
            .one(db)
            .await
            .map_err(|e| AppError::db("find parent comment", e))?;
        match parent {
            Some(parent) if parent.post_id == post_id => {}
            Some(_) => {
                return Err(AppError::param_error("parent_id", "Parent comment belongs to a different post"))
            }
            None => return Err(AppError::param_error("parent_id", "Parent comment does not exist")),
        }
    }

    let model = comment::ActiveModel {
        post_id: Set(post_id),
        user_id: Set(user_id),
        parent_id: Set(parent_id),
        content: Set(body.trim().to_string()),
        is_approved: Set(true),
        date_posted: Set(Utc::now()),
        ..Default::default()
    };
    model
        .insert(db)
        .await
        .map_err(|e| AppError::db("insert comment", e))
}

/// Direct children only, oldest first. Rendering deeper levels is up to the caller.
pub async fn list_replies(
    db: &DatabaseConnection,
    comment_id: i32,
    include_unapproved: bool,
) -> Result<Vec<comment::Model>, AppError> {
    find_comment(db, comment_id).await?;
    let mut query = comment::Entity::find().filter(comment::Column::ParentId.eq(comment_id));
    if !include_unapproved {
        query = query.filter(comment::Column::IsApproved.eq(true));
    }
    query
        .order_by_asc(comment::Column::DatePosted)
        .order_by_asc(comment::Column::Id)
        .all(db)
        .await
        .map_err(|e| AppError::db("list replies", e))
}

/// Top-level comments of a post, oldest first.
pub async fn list_for_post(
    db: &DatabaseConnection,
    post_id: i32,
    include_unapproved: bool,
    page: u64,
) -> Result<Page<comment::Model>, AppError> {
    find_post(db, post_id).await?;
    let mut query = comment::Entity::find()
        .filter(comment::Column::PostId.eq(post_id))
        .filter(comment::Column::ParentId.is_null());
    if !include_unapproved {
        query = query.filter(comment::Column::IsApproved.eq(true));
    }
    let query = query
        .order_by_asc(comment::Column::DatePosted)
        .order_by_asc(comment::Column::Id);
    fetch_page(db, query, page).await
}

/// A user's approved comments, newest first.
pub async fn list_by_user(db: &DatabaseConnection, user_id: i32, page: u64) -> Result<Page<comment::Model>, AppError> {
    let query = comment::Entity::find()
        .filter(comment::Column::UserId.eq(user_id))
        .filter(comment::Column::IsApproved.eq(true))
        .order_by_desc(comment::Column::DatePosted)
        .order_by_desc(comment::Column::Id);
    fetch_page(db, query, page).await
}

async fn fetch_page(
    db: &DatabaseConnection,
    query: Select<comment::Entity>,
    page: u64,
) -> Result<Page<comment::Model>, AppError> {
    let paginator = query.paginate(db, COMMENTS_PER_PAGE);
    let total = paginator
        .num_items()
        .await
        .map_err(|e| AppError::db("count comments", e))?;
    let items = paginator
        .fetch_page(page.saturating_sub(1))
        .await
        .map_err(|e| AppError::db("list comments", e))?;
    Ok(Page { items, total, page, size: COMMENTS_PER_PAGE })
}

/// The comment's author, the post's author and admins may delete. Replies are
/// kept and detached from the deleted parent in the same transaction.
pub async fn delete_comment(db: &DatabaseConnection, actor: &Identity, id: i32) -> Result<(), AppError> {
    let target = find_comment(db, id).await?;
    if target.user_id != actor.user_id && !actor.is_admin {
        let post = find_post(db, target.post_id).await?;
        if post.user_id != actor.user_id {
            return Err(AppError::forbidden());
        }
    }

    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            comment::Entity::update_many()
                .col_expr(comment::Column::ParentId, Expr::value(Option::<i32>::None))
                .filter(comment::Column::ParentId.eq(id))
                .exec(txn)
                .await
                .map_err(|e| AppError::db("detach replies", e))?;
            comment::Entity::delete_by_id(id)
                .exec(txn)
                .await
                .map_err(|e| AppError::db("delete comment", e))?;
            Ok(())
        })
    })
    .await
    .map_err(map_tx_error)?;

    info!("user {} deleted comment {}", actor.user_id, id);
    Ok(())
}

pub async fn set_approved(db: &DatabaseConnection, id: i32, approved: bool) -> Result<comment::Model, AppError> {
    let target = find_comment(db, id).await?;
    let mut active: comment::ActiveModel = target.into();
    active.is_approved = Set(approved);
    active
        .update(db)
        .await
        .map_err(|e| AppError::db("moderate comment", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{make_admin, memory_db, publish, register};

    #[actix_web::test]
    async fn replies_are_direct_children_only() {
        let db = memory_db().await;
        let alice = register(&db, "alice").await;
        let post = publish(&db, &alice, "Thread").await;

        let root = add_comment(&db, alice.id, post.id, "root", None).await.unwrap();
        assert!(root.is_approved);
        assert_eq!(root.parent_id, None);
        let child_a = add_comment(&db, alice.id, post.id, "a", Some(root.id)).await.unwrap();
        let child_b = add_comment(&db, alice.id, post.id, "b", Some(root.id)).await.unwrap();
        add_comment(&db, alice.id, post.id, "grandchild", Some(child_a.id)).await.unwrap();

        let replies = list_replies(&db, root.id, false).await.unwrap();
        let ids: Vec<i32> = replies.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![child_a.id, child_b.id]);

        let top = list_for_post(&db, post.id, false, 1).await.unwrap();
        assert_eq!(top.total, 1);
        assert_eq!(top.items[0].id, root.id);
    }

    #[actix_web::test]
    async fn parent_from_other_post_is_rejected() {
        let db = memory_db().await;
        let alice = register(&db, "alice").await;
        let first = publish(&db, &alice, "First").await;
        let second = publish(&db, &alice, "Second").await;
        let elsewhere = add_comment(&db, alice.id, first.id, "on first", None).await.unwrap();

        let err = add_comment(&db, alice.id, second.id, "reply", Some(elsewhere.id))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("parent_id"));

        let err = add_comment(&db, alice.id, second.id, "reply", Some(9999)).await.unwrap_err();
        assert_eq!(err.field(), Some("parent_id"));
    }

    #[actix_web::test]
    async fn body_is_validated() {
        let db = memory_db().await;
        let alice = register(&db, "alice").await;
        let post = publish(&db, &alice, "Rules").await;
        assert_eq!(
            add_comment(&db, alice.id, post.id, "   ", None).await.unwrap_err().field(),
            Some("content")
        );
        let long = "x".repeat(MAX_COMMENT_LEN + 1);
        assert!(add_comment(&db, alice.id, post.id, &long, None).await.is_err());
        assert!(matches!(
            add_comment(&db, alice.id, 4242, "hi", None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn deleting_parent_detaches_replies() {
        let db = memory_db().await;
        let alice = register(&db, "alice").await;
        let post = publish(&db, &alice, "Detach").await;
        let root = add_comment(&db, alice.id, post.id, "root", None).await.unwrap();
        let reply = add_comment(&db, alice.id, post.id, "reply", Some(root.id)).await.unwrap();

        delete_comment(&db, &Identity::from(&alice), root.id).await.unwrap();

        let kept = find_comment(&db, reply.id).await.unwrap();
        assert_eq!(kept.parent_id, None);
        let top = list_for_post(&db, post.id, false, 1).await.unwrap();
        assert_eq!(top.items.iter().map(|c| c.id).collect::<Vec<_>>(), vec![reply.id]);
    }

    #[actix_web::test]
    async fn who_may_delete() {
        let db = memory_db().await;
        let author = register(&db, "author").await;
        let commenter = register(&db, "commenter").await;
        let stranger = register(&db, "stranger").await;
        let admin = make_admin(&db, register(&db, "admin").await).await;
        let post = publish(&db, &author, "Perms").await;

        let c1 = add_comment(&db, commenter.id, post.id, "one", None).await.unwrap();
        let c2 = add_comment(&db, commenter.id, post.id, "two", None).await.unwrap();
        let c3 = add_comment(&db, commenter.id, post.id, "three", None).await.unwrap();

        let err = delete_comment(&db, &Identity::from(&stranger), c1.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        delete_comment(&db, &Identity::from(&commenter), c1.id).await.unwrap();
        delete_comment(&db, &Identity::from(&author), c2.id).await.unwrap();
        delete_comment(&db, &Identity::from(&admin), c3.id).await.unwrap();
        assert_eq!(list_for_post(&db, post.id, true, 1).await.unwrap().total, 0);
    }

    #[actix_web::test]
    async fn unapproved_comments_hidden_unless_asked() {
        let db = memory_db().await;
        let alice = register(&db, "alice").await;
        let post = publish(&db, &alice, "Moderated").await;
        let root = add_comment(&db, alice.id, post.id, "root", None).await.unwrap();
        let reply = add_comment(&db, alice.id, post.id, "spam", Some(root.id)).await.unwrap();

        let hidden = set_approved(&db, reply.id, false).await.unwrap();
        assert!(!hidden.is_approved);
        assert!(list_replies(&db, root.id, false).await.unwrap().is_empty());
        assert_eq!(list_replies(&db, root.id, true).await.unwrap().len(), 1);
        assert_eq!(list_by_user(&db, alice.id, 1).await.unwrap().total, 1);

        set_approved(&db, reply.id, true).await.unwrap();
        assert_eq!(list_by_user(&db, alice.id, 1).await.unwrap().total, 2);
    }
}
