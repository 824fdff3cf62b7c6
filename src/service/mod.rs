//! Service layer
//!
//! Contains the synchronization logic separated from HTTP handlers.
//! Services orchestrate the database, the source runner and the image
//! sanitizer.

mod clock;
mod refresh;
mod stats;
mod sync;

pub use clock::{Clock, SystemClock};
pub use refresh::{RefreshDetail, RefreshScheduler, RefreshSummary};
pub use stats::{GroupStats, MAX_GROUP_SIZE, TOP_PROFILES, group_stats};
pub use sync::{ProfileSynchronizer, SyncOutcome};
