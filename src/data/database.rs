//! SQLite database operations
//!
//! All database access goes through this module.
//! Every write is a single atomic statement keyed by handle, so
//! concurrent synchronizations of the same handle need no extra locking.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

const PROFILE_COLUMNS: &str = "handle, display_name, image_ref, follower_count, following_count, \
     post_count, biography, is_private, is_verified, last_synced_at";

/// Forward-only merge of the stored and incoming sync timestamps
const FORWARD_ONLY_SYNCED_AT: &str = "CASE \
     WHEN excluded.last_synced_at IS NULL THEN profiles.last_synced_at \
     WHEN profiles.last_synced_at IS NULL THEN excluded.last_synced_at \
     ELSE MAX(profiles.last_synced_at, excluded.last_synced_at) END";

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Get a stored profile by (normalized) handle
    pub async fn get_profile(&self, handle: &str) -> Result<Option<ProfileRecord>, AppError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE handle = ?"
        ))
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProfileRecord::from))
    }

    /// Get stored profiles for a set of handles
    ///
    /// Unknown handles are silently absent from the result.
    pub async fn list_profiles(&self, handles: &[String]) -> Result<Vec<ProfileRecord>, AppError> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE handle IN ("
        ));
        let mut separated = builder.separated(", ");
        for handle in handles {
            separated.push_bind(handle);
        }
        separated.push_unseparated(") ORDER BY handle ASC");

        let rows = builder
            .build_query_as::<ProfileRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ProfileRecord::from).collect())
    }

    /// Insert or fully replace a synchronized profile
    ///
    /// All profile-derived columns are overwritten as a unit. The
    /// `last_synced_at` column never moves backwards.
    pub async fn upsert_profile(&self, profile: &ProfileRecord) -> Result<(), AppError> {
        let synced_at = profile.last_synced_at.map(|t| t.timestamp_millis());

        sqlx::query(&format!(
            r#"
            INSERT INTO profiles (
                handle, display_name, image_ref, follower_count, following_count,
                post_count, biography, is_private, is_verified, last_synced_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(handle) DO UPDATE SET
                display_name = excluded.display_name,
                image_ref = excluded.image_ref,
                follower_count = excluded.follower_count,
                following_count = excluded.following_count,
                post_count = excluded.post_count,
                biography = excluded.biography,
                is_private = excluded.is_private,
                is_verified = excluded.is_verified,
                last_synced_at = {FORWARD_ONLY_SYNCED_AT}
            "#
        ))
        .bind(&profile.handle)
        .bind(&profile.display_name)
        .bind(&profile.image_ref)
        .bind(count_to_i64(profile.follower_count))
        .bind(count_to_i64(profile.following_count))
        .bind(count_to_i64(profile.post_count))
        .bind(&profile.biography)
        .bind(profile.is_private)
        .bind(profile.is_verified)
        .bind(synced_at)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a synchronization attempt without touching profile fields
    ///
    /// Unknown handles get a minimal row built from `placeholder_image`.
    /// Known handles only have `last_synced_at` advanced (never rewound).
    pub async fn mark_sync_attempt(
        &self,
        handle: &str,
        placeholder_image: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO profiles (handle, display_name, image_ref, last_synced_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(handle) DO UPDATE SET
                last_synced_at = {FORWARD_ONLY_SYNCED_AT}
            "#
        ))
        .bind(handle)
        .bind(handle)
        .bind(placeholder_image)
        .bind(attempted_at.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a handle that has never been synchronized
    ///
    /// # Returns
    /// `true` if a new row was created, `false` if the handle was known
    pub async fn register_handle(
        &self,
        handle: &str,
        placeholder_image: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (handle, display_name, image_ref, last_synced_at, created_at)
            VALUES (?, ?, ?, NULL, ?)
            ON CONFLICT(handle) DO NOTHING
            "#,
        )
        .bind(handle)
        .bind(handle)
        .bind(placeholder_image)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Select profiles due for a refresh
    ///
    /// Never-synchronized rows come first, then the least recently
    /// synchronized ones.
    ///
    /// # Arguments
    /// * `cutoff` - Rows synced at or before this instant are due
    /// * `limit` - Maximum rows returned
    pub async fn stale_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ProfileRecord>, AppError> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM profiles
            WHERE last_synced_at IS NULL OR last_synced_at <= ?
            ORDER BY last_synced_at IS NOT NULL, last_synced_at ASC, handle ASC
            LIMIT ?
            "#
        ))
        .bind(cutoff.timestamp_millis())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProfileRecord::from).collect())
    }

    /// Count stored profiles
    pub async fn count_profiles(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
