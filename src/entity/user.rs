use sea_orm::entity::prelude::*;

pub const DEFAULT_AVATAR: &str = "default.jpg";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "t_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub about_me: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub image_file: String,
    pub member_since: Option<DateTimeUtc>,
    pub last_seen: Option<DateTimeUtc>,
    #[sea_orm(unique)]
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
