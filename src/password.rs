use bcrypt::{hash, verify};
use log::warn;

use crate::error::AppError;

const COST: u32 = if cfg!(test) { 4 } else { 10 };

/// Salted bcrypt hash of `raw`. The salt is embedded in the returned string.
pub fn hash_password(raw: &str) -> Result<String, AppError> {
    hash(raw, COST).map_err(|e| {
        warn!("password hashing failed: {}", e);
        AppError::system_exception()
    })
}

/// Never errors: a missing or unparsable hash simply does not match.
pub fn verify_password(raw: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(stored) if !stored.is_empty() => verify(raw, stored).unwrap_or(false),
        _ => false,
    }
}
