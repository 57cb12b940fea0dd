use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};

use crate::model::Task;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "todos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub priority_id: Option<String>,
    pub order_index: i32,
    pub created_at: i64,
    pub updated_at: i64,
    /// Server clock when the row was last written
    pub synced_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::Token",
        to = "super::account::Column::Token",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Task {
    fn from(row: Model) -> Self {
        Self {
            id: row.id,
            text: row.text,
            completed: row.completed,
            priority_id: row.priority_id,
            order: row.order_index,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl ActiveModel {
    pub fn from_task(token: &str, task: &Task, synced_at: i64) -> Self {
        Self {
            token: ActiveValue::Set(token.to_string()),
            id: ActiveValue::Set(task.id.clone()),
            text: ActiveValue::Set(task.text.clone()),
            completed: ActiveValue::Set(task.completed),
            priority_id: ActiveValue::Set(task.priority_id.clone()),
            order_index: ActiveValue::Set(task.order),
            created_at: ActiveValue::Set(task.created_at),
            updated_at: ActiveValue::Set(task.updated_at),
            synced_at: ActiveValue::Set(synced_at),
        }
    }
}
