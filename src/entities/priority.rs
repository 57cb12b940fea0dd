use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};

use crate::model::Bucket;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "priorities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub color: String,
    pub order_index: i32,
    pub is_default: bool,
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

impl From<Model> for Bucket {
    fn from(row: Model) -> Self {
        Self {
            id: row.id,
            name: row.name,
            color: row.color,
            order: row.order_index,
            is_default: row.is_default,
        }
    }
}

impl ActiveModel {
    pub fn from_bucket(token: &str, bucket: &Bucket, synced_at: i64) -> Self {
        Self {
            token: ActiveValue::Set(token.to_string()),
            id: ActiveValue::Set(bucket.id.clone()),
            name: ActiveValue::Set(bucket.name.clone()),
            color: ActiveValue::Set(bucket.color.clone()),
            order_index: ActiveValue::Set(bucket.order),
            is_default: ActiveValue::Set(bucket.is_default),
            synced_at: ActiveValue::Set(synced_at),
        }
    }
}
