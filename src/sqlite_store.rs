//! SQLite-backed [`ArtifactStore`] implementation.
//!
//! Template queries use `LIKE` as an indexed prefilter and then re-check
//! each row with the same matchers the in-memory store uses, since SQLite's
//! `LIKE` folds ASCII case.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use upload_scout_core::models::UploadArtifact;
use upload_scout_core::store::{
    matches_template1, matches_template2, ArtifactStore, TAG_PLACEHOLDER,
};

/// SQLite implementation of the [`ArtifactStore`] trait.
pub struct SqliteArtifactStore {
    pool: SqlitePool,
}

impl SqliteArtifactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn query_like(&self, pattern: &str) -> Result<Vec<UploadArtifact>> {
        let rows = sqlx::query(
            "SELECT directory, script, package_name, image FROM upload_artifacts \
             WHERE image LIKE ? ESCAPE '\\' ORDER BY id",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_artifact).collect())
    }
}

fn row_to_artifact(row: &SqliteRow) -> UploadArtifact {
    UploadArtifact {
        directory: row.get("directory"),
        script: row.get("script"),
        package_name: row.get("package_name"),
        image: row.get("image"),
    }
}

/// Escape `LIKE` wildcards so `value` matches literally under `ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn delete_all_artifacts(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM upload_artifacts")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_artifacts(&self, batch: &[UploadArtifact]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for artifact in batch {
            sqlx::query(
                "INSERT INTO upload_artifacts (directory, script, package_name, image) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&artifact.directory)
            .bind(&artifact.script)
            .bind(&artifact.package_name)
            .bind(&artifact.image)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_exact_image(&self, image: &str) -> Result<Vec<UploadArtifact>> {
        let rows = sqlx::query(
            "SELECT directory, script, package_name, image FROM upload_artifacts \
             WHERE image = ? ORDER BY id",
        )
        .bind(image)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_artifact).collect())
    }

    async fn find_by_image_template1(&self, image: &str) -> Result<Vec<UploadArtifact>> {
        let pattern = format!("{}{}%", escape_like(image), TAG_PLACEHOLDER);
        let mut artifacts = self.query_like(&pattern).await?;
        artifacts.retain(|a| matches_template1(&a.image, image));
        Ok(artifacts)
    }

    async fn find_by_image_template2(&self, base_name: &str) -> Result<Vec<UploadArtifact>> {
        let pattern = format!("%/$%/{}{}%", escape_like(base_name), TAG_PLACEHOLDER);
        let mut artifacts = self.query_like(&pattern).await?;
        artifacts.retain(|a| matches_template2(&a.image, base_name));
        Ok(artifacts)
    }

    async fn list_artifacts(&self) -> Result<Vec<UploadArtifact>> {
        let rows = sqlx::query(
            "SELECT directory, script, package_name, image FROM upload_artifacts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_artifact).collect())
    }
}
