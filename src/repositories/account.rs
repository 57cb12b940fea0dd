//! Account repository for database operations.

use anyhow::Result;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveValue, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::account;

/// Repository for account-related database operations.
pub struct AccountRepository;

impl AccountRepository {
    /// Get an account by token.
    pub async fn get<C>(conn: &C, token: &str) -> Result<Option<account::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(account::Entity::find_by_id(token.to_string()).one(conn).await?)
    }

    /// Create the account on first sync, otherwise bump its last sync time.
    pub async fn record_sync<C>(conn: &C, token: &str, now: i64) -> Result<()>
    where
        C: ConnectionTrait,
    {
        let row = account::ActiveModel {
            token: ActiveValue::Set(token.to_string()),
            created_at: ActiveValue::Set(now),
            last_sync_at: ActiveValue::Set(Some(now)),
            email: ActiveValue::Set(None),
        };
        account::Entity::insert(row)
            .on_conflict(
                OnConflict::column(account::Column::Token)
                    .update_column(account::Column::LastSyncAt)
                    .to_owned(),
            )
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Store the recovery email of an account.
    pub async fn set_email<C>(conn: &C, token: &str, email: &str) -> Result<()>
    where
        C: ConnectionTrait,
    {
        account::Entity::update_many()
            .col_expr(account::Column::Email, Expr::value(email.to_string()))
            .filter(account::Column::Token.eq(token))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Accounts whose last activity is strictly older than `cutoff`.
    ///
    /// Last activity is `last_sync_at`, or `created_at` for accounts that
    /// never synced.
    pub async fn find_inactive_since<C>(conn: &C, cutoff: i64) -> Result<Vec<account::Model>>
    where
        C: ConnectionTrait,
    {
        let condition = Condition::any()
            .add(account::Column::LastSyncAt.lt(cutoff))
            .add(
                Condition::all()
                    .add(account::Column::LastSyncAt.is_null())
                    .add(account::Column::CreatedAt.lt(cutoff)),
            );
        Ok(account::Entity::find()
            .filter(condition)
            .order_by_asc(account::Column::Token)
            .all(conn)
            .await?)
    }

    /// The most recent sync stamp across all accounts.
    pub async fn latest_sync_at<C>(conn: &C) -> Result<Option<i64>>
    where
        C: ConnectionTrait,
    {
        Ok(account::Entity::find()
            .filter(account::Column::LastSyncAt.is_not_null())
            .order_by_desc(account::Column::LastSyncAt)
            .one(conn)
            .await?
            .and_then(|account| account.last_sync_at))
    }

    /// Number of stored accounts.
    pub async fn count<C>(conn: &C) -> Result<u64>
    where
        C: ConnectionTrait,
    {
        use sea_orm::PaginatorTrait;
        Ok(account::Entity::find().count(conn).await?)
    }

    /// Delete an account row. Returns true if it existed.
    pub async fn delete<C>(conn: &C, token: &str) -> Result<bool>
    where
        C: ConnectionTrait,
    {
        let result = account::Entity::delete_by_id(token.to_string()).exec(conn).await?;
        Ok(result.rows_affected > 0)
    }
}
