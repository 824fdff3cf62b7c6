//! Group statistics
//!
//! Aggregates stored profiles for a set of handles supplied by the
//! membership layer. Read-only: never contacts the source.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::data::{Database, ProfileRecord, normalize_handle};
use crate::error::AppError;
use crate::image::ImageSanitizer;

/// Number of profiles listed in `top_by_followers`
pub const TOP_PROFILES: usize = 5;

/// Upper bound on handles in a single request
pub const MAX_GROUP_SIZE: usize = 500;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub members: usize,
    /// Members with at least one successful synchronization
    pub synced_members: usize,
    pub total_followers: u64,
    pub total_following: u64,
    pub total_posts: u64,
    pub top_by_followers: Vec<ProfileRecord>,
}

impl GroupStats {
    /// Fold stored records of a group with `members` distinct handles
    pub fn from_records(members: usize, mut records: Vec<ProfileRecord>, top: usize) -> Self {
        let mut stats = GroupStats {
            members,
            ..GroupStats::default()
        };

        for record in &records {
            if record.last_synced_at.is_some() {
                stats.synced_members += 1;
            }
            stats.total_followers = stats.total_followers.saturating_add(record.follower_count);
            stats.total_following = stats.total_following.saturating_add(record.following_count);
            stats.total_posts = stats.total_posts.saturating_add(record.post_count);
        }

        records.sort_by(|a, b| {
            b.follower_count
                .cmp(&a.follower_count)
                .then_with(|| a.handle.cmp(&b.handle))
        });
        records.truncate(top);
        stats.top_by_followers = records;

        stats
    }
}

/// Compute statistics for a group
///
/// Handles are normalized and deduplicated; handles without a stored
/// record count as members with zero stats.
///
/// # Errors
/// `AppError::Validation` for malformed handles or oversized groups
pub async fn group_stats(
    db: &Database,
    sanitizer: &ImageSanitizer,
    handles: &[String],
) -> Result<GroupStats, AppError> {
    if handles.len() > MAX_GROUP_SIZE {
        return Err(AppError::Validation(format!(
            "at most {MAX_GROUP_SIZE} handles per request"
        )));
    }

    let unique: BTreeSet<String> = handles
        .iter()
        .map(|handle| normalize_handle(handle))
        .collect::<Result<_, _>>()?;
    let unique: Vec<String> = unique.into_iter().collect();

    let records = db
        .list_profiles(&unique)
        .await?
        .into_iter()
        .map(|mut record| {
            record.image_ref = sanitizer.sanitize(Some(&record.image_ref), &record.handle);
            record
        })
        .collect();

    Ok(GroupStats::from_records(unique.len(), records, TOP_PROFILES))
}
