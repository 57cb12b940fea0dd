use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    pub created_at: i64,
    pub last_sync_at: Option<i64>,
    pub email: Option<String>,
}

impl Model {
    /// Reference point of the retention window.
    pub fn last_activity(&self) -> i64 {
        self.last_sync_at.unwrap_or(self.created_at)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::todo::Entity")]
    Todos,
    #[sea_orm(has_many = "super::priority::Entity")]
    Priorities,
}

impl Related<super::todo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Todos.def()
    }
}

impl Related<super::priority::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Priorities.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
