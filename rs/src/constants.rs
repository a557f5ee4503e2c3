//! Constants for the hotness ranking system
//!
//! Scoring defaults, configuration bounds, and coordinator defaults live here
//! so the service, the coordinator, and the CLI agree on them.

// Default scoring parameters

/// Score contributed by each like.
pub const DEFAULT_LIKE_WEIGHT: f64 = 2.0;

/// Score contributed by each comment.
pub const DEFAULT_COMMENT_WEIGHT: f64 = 3.0;

/// Score contributed by each view.
pub const DEFAULT_VIEW_WEIGHT: f64 = 0.1;

/// Exponent applied to `age_in_hours + base_hours`.
pub const DEFAULT_GRAVITY: f64 = 1.8;

/// Offset added to post age before the gravity exponent is applied.
pub const DEFAULT_BASE_HOURS: f64 = 2.0;

// Configuration bounds (inclusive)

pub const LIKE_WEIGHT_RANGE: (f64, f64) = (0.0, 100.0);
pub const COMMENT_WEIGHT_RANGE: (f64, f64) = (0.0, 100.0);
pub const VIEW_WEIGHT_RANGE: (f64, f64) = (0.0, 10.0);
pub const GRAVITY_RANGE: (f64, f64) = (0.1, 5.0);
pub const BASE_HOURS_RANGE: (f64, f64) = (0.1, 48.0);

/// Milliseconds per hour, used to turn post age into hours.
pub const MILLIS_PER_HOUR: f64 = 3_600_000.0;

// Ranked query bounds

pub const DEFAULT_HOT_POSTS_LIMIT: usize = 20;
pub const MAX_HOT_POSTS_LIMIT: usize = 100;

/// Upper bound for `hours` in time-range queries (one year).
pub const MAX_TIME_RANGE_HOURS: u32 = 8760;

// Coordinator defaults

/// Pending triggers for one post that force an immediate recompute.
pub const DEFAULT_UPDATE_THRESHOLD: usize = 5;

/// Maximum number of posts serviced by one debounced batch.
pub const DEFAULT_BATCH_UPDATE_SIZE: usize = 50;

/// Debounce window in milliseconds.
pub const DEFAULT_UPDATE_DELAY_MS: u64 = 5_000;

/// Age after which an unflushed trigger is pruned (one hour).
pub const DEFAULT_TRIGGER_MAX_AGE_SECS: i64 = 3_600;

/// How often the maintenance loop prunes expired triggers.
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 600;
