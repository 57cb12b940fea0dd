//! Database connection and schema setup for the server.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityName, EntityTrait, Schema};

use crate::entities::{account, priority, todo};

/// In-memory SQLite databases vanish with their last connection.
const MEMORY_CONNECTION_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Connect to `database_url` and create any missing tables.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging_level(log::LevelFilter::Debug);
    if is_memory_url(database_url) {
        options
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(MEMORY_CONNECTION_LIFETIME)
            .max_lifetime(MEMORY_CONNECTION_LIFETIME);
    } else {
        options.max_connections(8);
    }

    let db = Database::connect(options)
        .await
        .with_context(|| format!("Failed to connect to database: {database_url}"))?;
    create_schema(&db).await.context("Failed to create database schema")?;
    info!("🗄️  Database ready ({database_url})");
    Ok(db)
}

/// Fresh private in-memory database, used by tests and ephemeral servers.
pub async fn connect_in_memory() -> Result<DatabaseConnection> {
    connect("sqlite::memory:").await
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    debug!("Ensured table {}", entity.table_name());
    Ok(())
}

/// Create tables and indexes from the entity definitions.
pub async fn create_schema<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, account::Entity).await?;
    create_table(db, &schema, todo::Entity).await?;
    create_table(db, &schema, priority::Entity).await?;

    let activity_index = Index::create()
        .if_not_exists()
        .name("idx_accounts_last_sync_at")
        .table(account::Entity)
        .col(account::Column::LastSyncAt)
        .to_owned();
    db.execute(backend.build(&activity_index)).await?;
    Ok(())
}
