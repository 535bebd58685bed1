use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use std::fs;
use std::path::Path;

use crate::config::AppConfig;

pub async fn connect_db(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let url = config.database_url();
    ensure_sqlite_path(&url);
    let mut options = ConnectOptions::new(url);
    options.sqlx_logging(false);
    let db = Database::connect(options).await?;
    init_sqlite_schema(&db).await?;
    Ok(db)
}

fn ensure_sqlite_path(url: &str) {
    let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return;
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(':') {
        return;
    }
    if let Some(parent) = Path::new(path).parent() {
        let _ = fs::create_dir_all(parent);
    }
}

/// Creates the tables on SQLite. Other backends are expected to be provisioned
/// out of band. sqlx turns `foreign_keys` on for every SQLite connection, which
/// the cascading deletes rely on.
pub async fn init_sqlite_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    if backend != DatabaseBackend::Sqlite {
        return Ok(());
    }

    let sql = include_str!("../schema-sqlite.sql");
    for stmt in split_sql(sql) {
        db.execute(Statement::from_string(backend, stmt)).await?;
    }
    info!("sqlite schema ready");
    Ok(())
}

fn split_sql(input: &str) -> Vec<String> {
    let mut buf = String::new();
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        buf.push_str(line);
        buf.push('\n');
    }
    buf.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
pub mod testing {
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

    use super::init_sqlite_schema;
    use crate::entity::{post, user};
    use crate::service::{account, post as post_service};

    /// Fresh in-memory database with the schema applied. A single connection
    /// keeps every query on the same in-memory file.
    pub async fn memory_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        init_sqlite_schema(&db).await.unwrap();
        db
    }

    pub async fn register(db: &DatabaseConnection, username: &str) -> user::Model {
        account::register(
            db,
            account::Registration {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password: "Secret123".to_string(),
            },
        )
        .await
        .unwrap()
    }

    pub async fn make_admin(db: &DatabaseConnection, user: user::Model) -> user::Model {
        let mut active: user::ActiveModel = user.into();
        active.is_admin = Set(true);
        active.update(db).await.unwrap()
    }

    pub async fn publish(db: &DatabaseConnection, author: &user::Model, title: &str) -> post::Model {
        post_service::create(
            db,
            author.id,
            post_service::PostDraft {
                title: title.to_string(),
                content: format!("{} body", title),
                summary: None,
                category: None,
                is_published: None,
            },
        )
        .await
        .unwrap()
    }
}
