//! Schema creation for the artifact database. Every statement is
//! idempotent, so `uscout init` can be run repeatedly.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the `upload_artifacts` table and its index on an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upload_artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            directory TEXT NOT NULL,
            script TEXT NOT NULL,
            package_name TEXT NOT NULL,
            image TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_artifacts_image ON upload_artifacts(image)")
        .execute(pool)
        .await?;

    Ok(())
}
