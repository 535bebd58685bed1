use std::env;
use std::path::PathBuf;

use crate::service::reset_token::DEFAULT_TTL_SECS;

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_header: String,
    pub upload_storage_path: String,
    /// Scheme and host used to build links sent by mail.
    pub public_base_url: String,
    pub reset_token_ttl_secs: i64,
    pub posts_per_page: u64,
    pub max_avatar_bytes: usize,
    pub cors_allow_origin: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = parse_env("SERVER_PORT", 38321);

        let sqlite_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/folio.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok();

        let jwt_secret = env::var("JWT_SECRET")
            .or_else(|_| env::var("SECRET_KEY"))
            .unwrap_or_else(|_| "dev-key-please-change-in-production".to_string());

        let token_header = env::var("TOKEN_HEADER").unwrap_or_else(|_| "token".to_string());

        let upload_storage_path = env::var("UPLOAD_STORAGE_PATH")
            .unwrap_or_else(|_| "./data/upload".to_string());
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", server_port));

        Self {
            server_port,
            sqlite_path,
            database_url,
            jwt_secret,
            token_header,
            upload_storage_path,
            public_base_url,
            reset_token_ttl_secs: parse_env("RESET_TOKEN_TTL_SECS", DEFAULT_TTL_SECS),
            posts_per_page: parse_env("POSTS_PER_PAGE", 6),
            max_avatar_bytes: parse_env("MAX_AVATAR_BYTES", 5 * 1024 * 1024),
            cors_allow_origin: env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string()),
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}?mode=rwc", path)
    }

    pub fn avatar_dir(&self) -> PathBuf {
        PathBuf::from(&self.upload_storage_path).join("profile_pics")
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/api/auth/reset/{}",
            self.public_base_url.trim_end_matches('/'),
            token
        )
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            database_url: Some("sqlite::memory:".to_string()),
            jwt_secret: "test-secret".to_string(),
            token_header: "token".to_string(),
            upload_storage_path: env::temp_dir()
                .join("folio-backend-tests")
                .to_string_lossy()
                .to_string(),
            public_base_url: "http://localhost".to_string(),
            reset_token_ttl_secs: DEFAULT_TTL_SECS,
            posts_per_page: 6,
            max_avatar_bytes: 5 * 1024 * 1024,
            cors_allow_origin: "*".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_path_becomes_url() {
        let mut config = AppConfig::for_tests();
        config.database_url = None;
        config.sqlite_path = "/tmp/blog.sqlite".to_string();
        assert_eq!(config.database_url(), "sqlite:///tmp/blog.sqlite?mode=rwc");

        config.sqlite_path = "sqlite::memory:".to_string();
        assert_eq!(config.database_url(), "sqlite::memory:");
    }

    #[test]
    fn reset_link_joins_base_url() {
        let mut config = AppConfig::for_tests();
        config.public_base_url = "https://blog.example/".to_string();
        assert_eq!(config.reset_link("abc"), "https://blog.example/api/auth/reset/abc");
    }
}
