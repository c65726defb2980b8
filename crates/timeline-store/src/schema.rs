//! Schema definitions and migration utilities.
//!
//! The PostgreSQL backend stores every logical database in the same four
//! tables, separated by namespace.

use sqlx::PgPool;

use crate::error::{StoreError, StoreResult};

/// Embedded migration SQL for the key/value schema (001_kv_schema.sql).
pub const KV_SCHEMA_MIGRATION: &str = include_str!("../../../migrations/001_kv_schema.sql");

/// Tables created by [`KV_SCHEMA_MIGRATION`].
pub const KV_TABLES: [&str; 4] = ["kv_strings", "kv_hashes", "kv_sets", "kv_zsets"];

/// Run all pending migrations against the database.
///
/// Idempotent: every statement checks for existing objects first.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    tracing::info!("Running database migrations...");

    tracing::debug!("Running key/value migration (001_kv_schema.sql)...");
    sqlx::raw_sql(KV_SCHEMA_MIGRATION)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Migration(format!("Key/value migration failed: {}", e)))?;

    tracing::info!("Migrations completed successfully");
    Ok(())
}

/// Check if the schema has been initialized.
///
/// Returns true if every key/value table exists.
pub async fn is_schema_initialized(pool: &PgPool) -> StoreResult<bool> {
    let result: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM information_schema.tables
        WHERE table_schema = 'public'
        AND table_name = ANY($1)
        "#,
    )
    .bind(&KV_TABLES[..])
    .fetch_one(pool)
    .await?;

    Ok(result.0 == KV_TABLES.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_migration_embedded() {
        for table in KV_TABLES {
            assert!(
                KV_SCHEMA_MIGRATION.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "missing table {}",
                table
            );
        }
    }

    #[test]
    fn test_zset_scores_are_integers() {
        assert!(KV_SCHEMA_MIGRATION.contains("score BIGINT NOT NULL"));
    }
}
