//! Task row repository for database operations.

use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::todo;
use crate::model::Task;

/// Repository for the task rows of an account.
pub struct TodoRepository;

impl TodoRepository {
    /// Get all task rows of an account ordered by order index.
    pub async fn get_all<C>(conn: &C, token: &str) -> Result<Vec<todo::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(todo::Entity::find()
            .filter(todo::Column::Token.eq(token))
            .order_by_asc(todo::Column::OrderIndex)
            .order_by_asc(todo::Column::Id)
            .all(conn)
            .await?)
    }

    /// Insert or overwrite a task row, stamping it with `synced_at`.
    pub async fn upsert<C>(conn: &C, token: &str, task: &Task, synced_at: i64) -> Result<()>
    where
        C: ConnectionTrait,
    {
        todo::Entity::insert(todo::ActiveModel::from_task(token, task, synced_at))
            .on_conflict(
                OnConflict::columns([todo::Column::Token, todo::Column::Id])
                    .update_columns([
                        todo::Column::Text,
                        todo::Column::Completed,
                        todo::Column::PriorityId,
                        todo::Column::OrderIndex,
                        todo::Column::CreatedAt,
                        todo::Column::UpdatedAt,
                        todo::Column::SyncedAt,
                    ])
                    .to_owned(),
            )
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Delete the given task rows of an account.
    pub async fn delete_ids<C>(conn: &C, token: &str, ids: &[String]) -> Result<u64>
    where
        C: ConnectionTrait,
    {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = todo::Entity::delete_many()
            .filter(todo::Column::Token.eq(token))
            .filter(todo::Column::Id.is_in(ids.iter().cloned()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Delete every task row of an account.
    pub async fn delete_all<C>(conn: &C, token: &str) -> Result<u64>
    where
        C: ConnectionTrait,
    {
        let result = todo::Entity::delete_many()
            .filter(todo::Column::Token.eq(token))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
