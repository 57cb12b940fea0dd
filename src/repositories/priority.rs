//! Bucket row repository for database operations.

use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::priority;
use crate::model::Bucket;

/// Repository for the bucket rows of an account.
pub struct PriorityRepository;

impl PriorityRepository {
    /// Get all bucket rows of an account ordered by order index.
    pub async fn get_all<C>(conn: &C, token: &str) -> Result<Vec<priority::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(priority::Entity::find()
            .filter(priority::Column::Token.eq(token))
            .order_by_asc(priority::Column::OrderIndex)
            .order_by_asc(priority::Column::Id)
            .all(conn)
            .await?)
    }

    /// Insert or overwrite a bucket row, stamping it with `synced_at`.
    pub async fn upsert<C>(conn: &C, token: &str, bucket: &Bucket, synced_at: i64) -> Result<()>
    where
        C: ConnectionTrait,
    {
        priority::Entity::insert(priority::ActiveModel::from_bucket(token, bucket, synced_at))
            .on_conflict(
                OnConflict::columns([priority::Column::Token, priority::Column::Id])
                    .update_columns([
                        priority::Column::Name,
                        priority::Column::Color,
                        priority::Column::OrderIndex,
                        priority::Column::IsDefault,
                        priority::Column::SyncedAt,
                    ])
                    .to_owned(),
            )
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Delete the given bucket rows of an account.
    pub async fn delete_ids<C>(conn: &C, token: &str, ids: &[String]) -> Result<u64>
    where
        C: ConnectionTrait,
    {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = priority::Entity::delete_many()
            .filter(priority::Column::Token.eq(token))
            .filter(priority::Column::Id.is_in(ids.iter().cloned()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Delete every bucket row of an account.
    pub async fn delete_all<C>(conn: &C, token: &str) -> Result<u64>
    where
        C: ConnectionTrait,
    {
        let result = priority::Entity::delete_many()
            .filter(priority::Column::Token.eq(token))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
