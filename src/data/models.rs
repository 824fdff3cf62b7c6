//! Data models
//!
//! Rust structs representing stored profiles and the raw rows
//! they are loaded from. Timestamps are chrono in memory and
//! Unix milliseconds on disk.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// =============================================================================
// Handle
// =============================================================================

/// Longest handle accepted by [`normalize_handle`]
pub const MAX_HANDLE_LEN: usize = 64;

/// Normalize a user supplied handle to its canonical identity
///
/// Trims whitespace, strips a single leading `@` and lowercases.
/// Only ASCII letters, digits, `.` and `_` are accepted.
///
/// # Errors
/// Returns `AppError::Validation` for empty, overlong or malformed handles
pub fn normalize_handle(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    let handle = trimmed.to_ascii_lowercase();

    if handle.is_empty() {
        return Err(AppError::Validation("handle cannot be empty".to_string()));
    }
    if handle.len() > MAX_HANDLE_LEN {
        return Err(AppError::Validation(format!(
            "handle must be at most {} characters",
            MAX_HANDLE_LEN
        )));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err(AppError::Validation(
            "handle may only contain letters, digits, '.' and '_'".to_string(),
        ));
    }

    Ok(handle)
}

// =============================================================================
// Profile
// =============================================================================

/// Canonical structured profile
///
/// Every field except `handle` is replaced as a unit on each
/// successful synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    /// Lowercase, immutable identity
    pub handle: String,
    pub display_name: String,
    /// Proxied, local or placeholder image reference; never empty
    pub image_ref: String,
    pub follower_count: u64,
    pub following_count: u64,
    pub post_count: u64,
    pub biography: String,
    pub is_private: bool,
    pub is_verified: bool,
    /// `None` means never synchronized
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    /// Minimal record used when nothing is known about a handle
    pub fn placeholder(handle: &str, image_ref: String) -> Self {
        Self {
            handle: handle.to_string(),
            display_name: handle.to_string(),
            image_ref,
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            biography: String::new(),
            is_private: false,
            is_verified: false,
            last_synced_at: None,
        }
    }

    /// Whether the record is still inside the freshness window at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        match self.last_synced_at {
            Some(synced_at) => now - synced_at < ttl,
            None => false,
        }
    }
}

/// Raw `profiles` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub handle: String,
    pub display_name: String,
    pub image_ref: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub biography: String,
    pub is_private: bool,
    pub is_verified: bool,
    pub last_synced_at: Option<i64>,
}

impl From<ProfileRow> for ProfileRecord {
    fn from(row: ProfileRow) -> Self {
        Self {
            handle: row.handle,
            display_name: row.display_name,
            image_ref: row.image_ref,
            follower_count: row.follower_count.max(0) as u64,
            following_count: row.following_count.max(0) as u64,
            post_count: row.post_count.max(0) as u64,
            biography: row.biography,
            is_private: row.is_private,
            is_verified: row.is_verified,
            last_synced_at: row.last_synced_at.and_then(from_millis),
        }
    }
}

/// Convert a stored millisecond timestamp back to UTC
pub(crate) fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Drop sub-millisecond precision so a timestamp survives a storage round trip
pub fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(time.timestamp_millis()).unwrap_or(time)
}

/// Saturating conversion for count columns
pub(crate) fn count_to_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
