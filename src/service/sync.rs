//! Freshness-gated profile synchronization
//!
//! The synchronizer is the only writer of profile records. Reads inside
//! the freshness window never touch the source; stale or unknown handles
//! go through the strategy runner and are upserted as a whole.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::clock::Clock;
use crate::config::SyncConfig;
use crate::data::{Database, ProfileRecord, normalize_handle, truncate_to_millis};
use crate::error::AppError;
use crate::image::ImageSanitizer;
use crate::metrics::{PROFILE_CACHE_TOTAL, PROFILE_SYNC_TOTAL};
use crate::source::{ProfileFields, StrategyRunner};

/// Result of one synchronization attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Fresh data was stored
    Updated(ProfileRecord),
    /// Every strategy failed
    NoData,
    /// The source answered, but with neither followers nor a real image
    Invalid,
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Updated(_) => "updated",
            SyncOutcome::NoData => "no_data",
            SyncOutcome::Invalid => "invalid",
        }
    }
}

/// Freshness-gated synchronizer
pub struct ProfileSynchronizer {
    db: Arc<Database>,
    runner: Arc<StrategyRunner>,
    sanitizer: ImageSanitizer,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    biography_max_chars: usize,
}

impl ProfileSynchronizer {
    pub fn new(
        db: Arc<Database>,
        runner: Arc<StrategyRunner>,
        sanitizer: ImageSanitizer,
        clock: Arc<dyn Clock>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            db,
            runner,
            sanitizer,
            clock,
            ttl: config.ttl(),
            biography_max_chars: config.biography_max_chars,
        }
    }

    pub fn sanitizer(&self) -> &ImageSanitizer {
        &self.sanitizer
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // =========================================================================
    // Inbound operations
    // =========================================================================

    /// Whether `handle` is unknown or outside its freshness window
    ///
    /// # Errors
    /// `AppError::Validation` for malformed handles, storage errors otherwise
    pub async fn needs_refresh(&self, handle: &str) -> Result<bool, AppError> {
        let handle = normalize_handle(handle)?;
        let stored = self.db.get_profile(&handle).await?;
        Ok(!stored.is_some_and(|record| record.is_fresh(self.clock.now(), self.ttl)))
    }

    /// Synchronize `handle` regardless of freshness
    ///
    /// A failed attempt leaves any stored record (and its timestamp)
    /// untouched, so a manual retry is never penalized.
    ///
    /// # Returns
    /// The stored record on success, `None` when no usable data was found
    pub async fn force_refresh(&self, handle: &str) -> Result<Option<ProfileRecord>, AppError> {
        let handle = normalize_handle(handle)?;

        match self.sync_once(&handle).await? {
            SyncOutcome::Updated(record) => Ok(Some(record)),
            SyncOutcome::NoData | SyncOutcome::Invalid => Ok(None),
        }
    }

    /// Return the stored record while fresh, otherwise synchronize first
    ///
    /// Never fails because the source failed. The attempt is recorded as
    /// backoff, so the handle is not fetched again until its freshness
    /// window elapses: a stale record is served with its stored fields,
    /// and an unknown handle gets a placeholder record.
    pub async fn get_or_refresh(&self, handle: &str) -> Result<ProfileRecord, AppError> {
        let handle = normalize_handle(handle)?;
        let stored = self.db.get_profile(&handle).await?;

        if let Some(record) = &stored {
            if record.is_fresh(self.clock.now(), self.ttl) {
                PROFILE_CACHE_TOTAL.with_label_values(&["hit"]).inc();
                tracing::debug!(handle = %handle, "Serving fresh profile from store");
                return Ok(self.present(record.clone()));
            }
        }

        PROFILE_CACHE_TOTAL.with_label_values(&["miss"]).inc();
        tracing::debug!(handle = %handle, known = stored.is_some(), "Profile due for refresh");

        if let SyncOutcome::Updated(record) = self.sync_once(&handle).await? {
            return Ok(record);
        }

        self.record_failed_attempt(&handle).await?;
        match self.db.get_profile(&handle).await? {
            Some(record) => {
                tracing::info!(
                    handle = %handle,
                    known = stored.is_some(),
                    "Refresh failed, serving stored profile with backoff"
                );
                Ok(self.present(record))
            }
            None => {
                let placeholder = self.sanitizer.placeholder_for(&handle);
                Ok(ProfileRecord::placeholder(&handle, placeholder))
            }
        }
    }

    /// Start tracking a handle without contacting the source
    ///
    /// Unknown handles are stored with a placeholder and no sync
    /// timestamp, which puts them first in the refresh queue.
    pub async fn track(&self, handle: &str) -> Result<ProfileRecord, AppError> {
        let handle = normalize_handle(handle)?;
        let placeholder = self.sanitizer.placeholder_for(&handle);

        if self.db.register_handle(&handle, &placeholder).await? {
            tracing::info!(handle = %handle, "Tracking new handle");
        }

        let record = self
            .db
            .get_profile(&handle)
            .await?
            .unwrap_or_else(|| ProfileRecord::placeholder(&handle, placeholder));
        Ok(self.present(record))
    }

    // =========================================================================
    // Scheduler support
    // =========================================================================

    /// Handles due for a refresh, never-synchronized ones first
    pub async fn due_handles(&self, limit: u32) -> Result<Vec<String>, AppError> {
        let cutoff = self.clock.now() - self.ttl;
        let candidates = self.db.stale_candidates(cutoff, limit).await?;
        Ok(candidates.into_iter().map(|record| record.handle).collect())
    }

    /// Backoff write: advance the sync timestamp without touching fields
    pub async fn record_failed_attempt(&self, handle: &str) -> Result<(), AppError> {
        let placeholder = self.sanitizer.placeholder_for(handle);
        self.db
            .mark_sync_attempt(handle, &placeholder, truncate_to_millis(self.clock.now()))
            .await
    }

    /// Fetch, validate and store one profile
    ///
    /// Only `Updated` writes to storage.
    pub(crate) async fn sync_once(&self, handle: &str) -> Result<SyncOutcome, AppError> {
        let Some(fields) = self.runner.resolve(handle).await else {
            PROFILE_SYNC_TOTAL.with_label_values(&["no_data"]).inc();
            return Ok(SyncOutcome::NoData);
        };

        let synced_at = truncate_to_millis(self.clock.now());
        let record = self.build_record(handle, fields, synced_at);
        if !self.is_valid(&record) {
            PROFILE_SYNC_TOTAL.with_label_values(&["invalid"]).inc();
            tracing::warn!(handle = %handle, "Resolved profile has no followers and no image");
            return Ok(SyncOutcome::Invalid);
        }

        self.db.upsert_profile(&record).await?;
        PROFILE_SYNC_TOTAL.with_label_values(&["updated"]).inc();
        tracing::info!(
            handle = %handle,
            followers = record.follower_count,
            "Profile synchronized"
        );

        Ok(SyncOutcome::Updated(record))
    }

    // =========================================================================
    // Record shaping
    // =========================================================================

    fn build_record(
        &self,
        handle: &str,
        fields: ProfileFields,
        synced_at: DateTime<Utc>,
    ) -> ProfileRecord {
        let display_name = fields
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(handle)
            .to_string();
        let biography: String = fields
            .biography
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(self.biography_max_chars)
            .collect();

        ProfileRecord {
            handle: handle.to_string(),
            display_name,
            image_ref: self.sanitizer.sanitize(fields.image_url.as_deref(), handle),
            follower_count: fields.followers(),
            following_count: fields.following(),
            post_count: fields.posts(),
            biography,
            is_private: fields.is_private.unwrap_or(false),
            is_verified: fields.is_verified.unwrap_or(false),
            last_synced_at: Some(synced_at),
        }
    }

    fn is_valid(&self, record: &ProfileRecord) -> bool {
        record.follower_count > 0 || !self.sanitizer.is_placeholder(&record.image_ref)
    }

    /// Guarantee a usable image reference on every record handed out
    fn present(&self, mut record: ProfileRecord) -> ProfileRecord {
        record.image_ref = self
            .sanitizer
            .sanitize(Some(&record.image_ref), &record.handle);
        record
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::image::GeneratedAvatar;
    use crate::service::clock::ManualClock;
    use crate::source::test_support::StubStrategy;
    use crate::source::{Extractor, RetrievalStrategy};
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) struct Harness {
        pub(crate) synchronizer: Arc<ProfileSynchronizer>,
        pub(crate) db: Arc<Database>,
        pub(crate) clock: Arc<ManualClock>,
        _temp_dir: TempDir,
    }

    pub(crate) fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    pub(crate) async fn harness(strategies: Vec<Arc<StubStrategy>>) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&temp_dir.path().join("sync.db")).await.unwrap());
        let clock = ManualClock::starting_at(start());
        let runner = StrategyRunner::new(
            strategies
                .into_iter()
                .map(|s| s as Arc<dyn RetrievalStrategy>)
                .collect(),
            Extractor::default(),
            DelayRange::NONE,
            Duration::from_millis(500),
        );
        let sanitizer = ImageSanitizer::new(
            "/api/image-proxy",
            Arc::new(GeneratedAvatar::new("https://avatars.example/api")),
        );
        let config = SyncConfig {
            ttl_seconds: 86_400,
            biography_max_chars: 20,
        };

        let synchronizer = Arc::new(ProfileSynchronizer::new(
            db.clone(),
            Arc::new(runner),
            sanitizer,
            clock.clone(),
            &config,
        ));

        Harness {
            synchronizer,
            db,
            clock,
            _temp_dir: temp_dir,
        }
    }

    const ALICE_JSON: &str = r#"{"user": {
        "username": "alice",
        "full_name": "Alice",
        "biography": "a very long biography that will be cut",
        "profile_pic_url": "https://cdn.example.com/alice.jpg",
        "edge_followed_by": {"count": 1234},
        "edge_follow": {"count": 56},
        "edge_owner_to_timeline_media": {"count": 7},
        "is_verified": true
    }}"#;

    #[tokio::test]
    async fn unknown_handle_is_synchronized_and_stored() {
        let source = StubStrategy::body("a", ALICE_JSON);
        let h = harness(vec![source.clone()]).await;

        let record = h.synchronizer.get_or_refresh("@Alice").await.unwrap();

        assert_eq!(record.handle, "alice");
        assert_eq!(record.display_name, "Alice");
        assert_eq!(record.follower_count, 1234);
        assert_eq!(record.following_count, 56);
        assert_eq!(record.post_count, 7);
        assert!(record.is_verified);
        assert_eq!(record.biography.chars().count(), 20);
        assert!(record.image_ref.starts_with("/api/image-proxy?url="));
        assert_eq!(record.last_synced_at, Some(start()));
        assert_eq!(h.db.get_profile("alice").await.unwrap(), Some(record));
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn freshness_gate_blocks_fetch_until_ttl_elapses() {
        let source = StubStrategy::body("a", ALICE_JSON);
        let h = harness(vec![source.clone()]).await;
        let ttl = chrono::Duration::seconds(86_400);

        h.synchronizer.get_or_refresh("alice").await.unwrap();
        assert_eq!(source.call_count(), 1);

        h.clock.set(start() + ttl - chrono::Duration::seconds(1));
        assert!(!h.synchronizer.needs_refresh("alice").await.unwrap());
        let cached = h.synchronizer.get_or_refresh("alice").await.unwrap();
        assert_eq!(cached.last_synced_at, Some(start()));
        assert_eq!(source.call_count(), 1);

        h.clock.set(start() + ttl + chrono::Duration::seconds(1));
        assert!(h.synchronizer.needs_refresh("alice").await.unwrap());
        let refreshed = h.synchronizer.get_or_refresh("alice").await.unwrap();
        assert_eq!(source.call_count(), 2);
        assert_eq!(
            refreshed.last_synced_at,
            Some(start() + ttl + chrono::Duration::seconds(1))
        );
    }

    #[tokio::test]
    async fn scheduler_and_reads_agree_when_ttl_elapses_exactly() {
        let h = harness(vec![StubStrategy::body("a", ALICE_JSON)]).await;
        h.synchronizer.get_or_refresh("alice").await.unwrap();

        h.clock.set(start() + chrono::Duration::seconds(86_400));
        assert!(h.synchronizer.needs_refresh("alice").await.unwrap());
        assert_eq!(h.synchronizer.due_handles(5).await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn strategies_are_tried_in_order_once_each() {
        let first = StubStrategy::status("first", 429);
        let second = StubStrategy::body("second", "<html>blocked</html>");
        let third = StubStrategy::body("third", "10 Followers, 2 Following, 1 Posts");
        let h = harness(vec![first.clone(), second.clone(), third.clone()]).await;

        let record = h.synchronizer.get_or_refresh("carol").await.unwrap();

        assert_eq!(record.follower_count, 10);
        assert_eq!(
            (first.call_count(), second.call_count(), third.call_count()),
            (1, 1, 1)
        );
    }

    #[tokio::test]
    async fn unresolvable_unknown_handle_gets_placeholder_and_backs_off() {
        let first = StubStrategy::status("first", 500);
        let second = StubStrategy::status("second", 503);
        let h = harness(vec![first.clone(), second.clone()]).await;

        let record = h.synchronizer.get_or_refresh("carol").await.unwrap();

        assert_eq!(record.handle, "carol");
        assert_eq!(record.follower_count, 0);
        assert!(h.synchronizer.sanitizer().is_placeholder(&record.image_ref));
        assert_eq!(record.last_synced_at, Some(start()));
        assert_eq!((first.call_count(), second.call_count()), (1, 1));

        let stored = h.db.get_profile("carol").await.unwrap().unwrap();
        assert_eq!(stored.last_synced_at, Some(start()));
        assert!(!h.synchronizer.needs_refresh("carol").await.unwrap());
        assert!(h.synchronizer.due_handles(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_unknown_handle_is_fetched_once_per_window() {
        let source = StubStrategy::status("down", 500);
        let h = harness(vec![source.clone()]).await;

        for _ in 0..3 {
            h.synchronizer.get_or_refresh("carol").await.unwrap();
        }
        assert_eq!(source.call_count(), 1);

        h.clock.advance(chrono::Duration::seconds(86_400));
        h.synchronizer.get_or_refresh("carol").await.unwrap();
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn stale_record_is_served_and_backs_off_when_refresh_fails() {
        let source = StubStrategy::status("down", 500);
        let h = harness(vec![source.clone()]).await;
        let stale = ProfileRecord {
            last_synced_at: Some(start() - chrono::Duration::days(3)),
            follower_count: 77,
            ..ProfileRecord::placeholder("dora", "https://cdn.example.com/dora.jpg".to_string())
        };
        h.db.upsert_profile(&stale).await.unwrap();

        for _ in 0..3 {
            let record = h.synchronizer.get_or_refresh("dora").await.unwrap();
            assert_eq!(record.follower_count, 77);
            assert!(record.image_ref.starts_with("/api/image-proxy?url=https%3A%2F%2Fcdn"));
        }
        assert_eq!(source.call_count(), 1);

        let stored = h.db.get_profile("dora").await.unwrap().unwrap();
        assert_eq!(stored.last_synced_at, Some(start()));
        assert_eq!(stored.follower_count, 77);
        assert_eq!(stored.image_ref, stale.image_ref);
    }

    #[tokio::test]
    async fn failed_manual_refresh_keeps_timestamp() {
        let h = harness(vec![StubStrategy::status("down", 500)]).await;
        let synced = start() - chrono::Duration::hours(1);
        let existing = ProfileRecord {
            last_synced_at: Some(synced),
            follower_count: 5,
            ..ProfileRecord::placeholder("erin", "/local/erin.png".to_string())
        };
        h.db.upsert_profile(&existing).await.unwrap();

        assert!(h.synchronizer.force_refresh("erin").await.unwrap().is_none());

        let stored = h.db.get_profile("erin").await.unwrap().unwrap();
        assert_eq!(stored.last_synced_at, Some(synced));
        assert_eq!(stored.follower_count, 5);
    }

    #[tokio::test]
    async fn force_refresh_ignores_freshness() {
        let source = StubStrategy::body("a", ALICE_JSON);
        let h = harness(vec![source.clone()]).await;

        h.synchronizer.get_or_refresh("alice").await.unwrap();
        h.clock.advance(chrono::Duration::minutes(5));
        let record = h.synchronizer.force_refresh("alice").await.unwrap().unwrap();

        assert_eq!(source.call_count(), 2);
        assert_eq!(
            record.last_synced_at,
            Some(start() + chrono::Duration::minutes(5))
        );
    }

    #[tokio::test]
    async fn invalid_resolution_is_not_stored() {
        // Followers are zero and the only image is not an http(s) URL
        let source = StubStrategy::body(
            "a",
            r#"{"user": {"username": "gus", "follower_count": 0, "profile_pic_url": "ftp://files.example/gus.png"}}"#,
        );
        let h = harness(vec![source]).await;

        assert!(h.synchronizer.force_refresh("gus").await.unwrap().is_none());
        assert!(h.db.get_profile("gus").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn track_registers_without_fetching() {
        let source = StubStrategy::body("a", ALICE_JSON);
        let h = harness(vec![source.clone()]).await;

        let record = h.synchronizer.track("Hank").await.unwrap();

        assert_eq!(record.handle, "hank");
        assert!(record.last_synced_at.is_none());
        assert_eq!(source.call_count(), 0);
        assert!(h.synchronizer.needs_refresh("hank").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_handles_are_rejected() {
        let h = harness(vec![]).await;
        assert!(matches!(
            h.synchronizer.get_or_refresh("not a handle").await,
            Err(AppError::Validation(_))
        ));
    }
}
