//! Store-facing operations. Handlers validate transport concerns and call in
//! here; everything below talks to the database through sea-orm.

pub mod account;
pub mod comment;
pub mod like;
pub mod message;
pub mod post;
pub mod reset_token;
pub mod settings;

use sea_orm::{ConnectionTrait, Statement};
use validator::ValidateEmail;

use crate::error::AppError;

/// One page of an ordered query. `page` is 1-based.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
        }
    }
}

pub fn normalize_page(page: Option<u64>) -> u64 {
    page.unwrap_or(1).max(1)
}

pub(crate) async fn exec_sql<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<u64, AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    db.execute(stmt)
        .await
        .map(|r| r.rows_affected())
        .map_err(|e| AppError::db(sql, e))
}

pub(crate) fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.trim().chars().count();
    if len < min {
        if min == 1 {
            return Err(AppError::param_error(field, format!("{} cannot be empty", field)));
        }
        return Err(AppError::param_error(
            field,
            format!("{} must be between {} and {} characters", field, min, max),
        ));
    }
    if len > max {
        return Err(AppError::param_error(
            field,
            format!("{} cannot exceed {} characters", field, max),
        ));
    }
    Ok(())
}

/// Address shape via `validator`, plus a dotted domain: single-label hosts
/// are not deliverable addresses for this site.
pub(crate) fn check_email(field: &str, value: &str) -> Result<(), AppError> {
    let value = value.trim();
    let dotted = value
        .rsplit_once('@')
        .map(|(_, domain)| domain.contains('.'))
        .unwrap_or(false);
    if !value.validate_email() || !dotted || value.len() > 120 {
        return Err(AppError::param_error(field, "Please enter a valid email address"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_checks_name_the_field() {
        assert!(check_len("title", "hello", 1, 100).is_ok());
        let err = check_len("title", "   ", 1, 100).unwrap_err();
        assert_eq!(err.field(), Some("title"));
        assert!(check_len("username", "ab", 3, 20).is_err());
        assert!(check_len("username", &"a".repeat(21), 3, 20).is_err());
    }

    #[test]
    fn email_shape() {
        assert!(check_email("email", "a@x.com").is_ok());
        assert!(check_email("email", "a@x").is_err());
        assert!(check_email("email", "@x.com").is_err());
        assert!(check_email("email", "a b@x.com").is_err());
        for bad in ["a@@x.com", "a@x..com", "a@b@c.com", "a,b@x.com", "a@x.", "a@.x.com"] {
            assert!(check_email("email", bad).is_err(), "{} should be rejected", bad);
        }
        assert!(check_email("email", "first.last+tag@mail.example.org").is_ok());
    }

    #[test]
    fn page_defaults_to_one() {
        assert_eq!(normalize_page(None), 1);
        assert_eq!(normalize_page(Some(0)), 1);
        assert_eq!(normalize_page(Some(4)), 4);
    }
}
