use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::entity::user;
use crate::error::AppError;

const SESSION_DAYS: i64 = 30;

/// The authenticated caller, as loaded at the start of the request.
#[derive(Clone, Debug)]
pub struct Identity {
    pub user_id: i32,
    pub username: String,
    pub is_admin: bool,
}

impl From<&user::Model> for Identity {
    fn from(user: &user::Model) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// Per-request context handed to every handler. Anonymous callers carry no
/// identity; handlers ask for the capability they need up front.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn require_login(&self) -> Result<&Identity, AppError> {
        self.identity.as_ref().ok_or_else(AppError::need_login)
    }

    pub fn require_admin(&self) -> Result<&Identity, AppError> {
        let identity = self.require_login()?;
        if !identity.is_admin {
            return Err(AppError::forbidden());
        }
        Ok(identity)
    }

    /// For `/user/{username}/...` routes: the owner or an admin.
    pub fn require_self_or_admin(&self, username: &str) -> Result<&Identity, AppError> {
        let identity = self.require_login()?;
        if identity.username != username && !identity.is_admin {
            return Err(AppError::forbidden());
        }
        Ok(identity)
    }

    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().map(|i| i.is_admin).unwrap_or(false)
    }
}

impl FromRequest for RequestContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let token = extract_token(req, &config);

        Box::pin(async move {
            let Some(token) = token else {
                return Ok(RequestContext::anonymous());
            };
            let identity = authenticate_token(&db, &config, &token).await?;
            Ok(RequestContext { identity })
        })
    }
}

#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "loginId")]
    login_id: i32,
    exp: usize,
}

pub fn issue_session_token(config: &AppConfig, user_id: i32) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::days(SESSION_DAYS)).timestamp() as usize;
    let claims = Claims { login_id: user_id, exp };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::system_exception())
}

fn extract_token(req: &HttpRequest, config: &AppConfig) -> Option<String> {
    let header = config.token_header.as_str();
    req.headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().trim_start_matches("Bearer ").trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Bad, expired or orphaned tokens and deactivated accounts resolve to no
/// identity. Only a store failure is an error.
async fn authenticate_token(
    db: &DatabaseConnection,
    config: &AppConfig,
    token: &str,
) -> Result<Option<Identity>, AppError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let claims = match decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256)) {
        Ok(data) => data.claims,
        Err(e) => {
            debug!("rejected session token: {}", e);
            return Ok(None);
        }
    };

    let found = user::Entity::find_by_id(claims.login_id)
        .one(db)
        .await
        .map_err(|e| AppError::db("load session user", e))?;
    Ok(found.filter(|u| u.is_active).map(|u| Identity::from(&u)))
}
