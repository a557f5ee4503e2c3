//! Hotness: forum post ranking with debounced real-time updates
//!
//! Scores posts by recency-decayed engagement and coordinates when those
//! scores are recomputed in response to likes, comments, and views.
//!
//! This library provides both a programmatic API for embedding into a forum
//! backend and a standalone operator binary for sweeps and ranked listings.

pub mod constants;
pub mod coordinator;
pub mod hotness;
pub mod models;
pub mod storage;

// Re-export main types for convenience
pub use coordinator::{
    BatchOutcome, CoordinatorConfig, CoordinatorConfigPatch, HotnessUpdateService, Priority,
    QueueStatus, TriggerKind, TriggerOutcome, UpdateTrigger,
};
pub use hotness::{compute_hotness, validate_config, HotnessError, HotnessService};
pub use models::{
    BatchReport, HotPost, HotnessConfig, HotnessConfigPatch, HotnessOutcome, HotnessTrend, Post,
    PostId, PostRepository, User, UserId,
};
pub use storage::{FileStorage, MemoryStorage, StorageError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
