use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "t_user_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i32,
    pub email_notifications: bool,
    pub comment_notifications: bool,
    pub reply_notifications: bool,
    pub newsletter: bool,
    pub show_email: bool,
    pub show_last_seen: bool,
    pub allow_search_engines: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
