//! SQLite artifact backend

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::ArtifactBackend;
use crate::error::ArtifactError;

/// Blobs stored in the `artifacts` table
#[derive(Clone)]
pub struct SqliteArtifactBackend {
    pool: SqlitePool,
}

impl SqliteArtifactBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Remove artifacts created before `cutoff`; returns how many were deleted
    pub async fn delete_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<u64, ArtifactError> {
        let result = sqlx::query(
            r#"
            DELETE FROM artifacts WHERE created_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ArtifactBackend for SqliteArtifactBackend {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO artifacts (bucket, object_key, bytes, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (bucket, object_key)
            DO UPDATE SET bytes = excluded.bytes, created_at = excluded.created_at
            "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(bytes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT bytes
            FROM artifacts
            WHERE bucket = ? AND object_key = ?
            "#,
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ArtifactError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;

        Ok(row.bytes)
    }
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    bytes: Vec<u8>,
}
