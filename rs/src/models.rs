//! Core data models for hotness ranking
//!
//! Posts are owned by the surrounding forum application; this crate only reads
//! their engagement counters and writes back a single `hotness_score` field.

use crate::constants::{
    DEFAULT_BASE_HOURS, DEFAULT_COMMENT_WEIGHT, DEFAULT_GRAVITY, DEFAULT_LIKE_WEIGHT,
    DEFAULT_VIEW_WEIGHT, MILLIS_PER_HOUR,
};
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for posts
pub type PostId = Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Engagement snapshot of a forum post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    /// Unique identifier
    pub id: PostId,

    /// Author of the post (joined into ranked listings)
    pub author_id: UserId,

    pub title: String,

    pub like_count: u64,
    pub comment_count: u64,
    pub view_count: u64,

    /// When the post was published; age is measured from here
    pub created_at: DateTime<Utc>,

    /// Last persisted hotness score
    #[serde(default)]
    pub hotness_score: f64,

    /// Soft-deleted posts are never scored or listed
    #[serde(default)]
    pub is_deleted: bool,
}

impl Post {
    /// Create a fresh post with no engagement
    pub fn new(author_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            title: title.into(),
            like_count: 0,
            comment_count: 0,
            view_count: 0,
            created_at: Utc::now(),
            hotness_score: 0.0,
            is_deleted: false,
        }
    }

    /// Set engagement counters (likes, comments, views)
    pub fn with_engagement(mut self, likes: u64, comments: u64, views: u64) -> Self {
        self.like_count = likes;
        self.comment_count = comments;
        self.view_count = views;
        self
    }

    /// Hours elapsed between creation and `now`, clamped at zero
    pub fn age_in_hours(&self, now: DateTime<Utc>) -> f64 {
        let millis = now.signed_duration_since(self.created_at).num_milliseconds();
        (millis as f64 / MILLIS_PER_HOUR).max(0.0)
    }
}

/// Author metadata joined into ranked listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            avatar_url: None,
        }
    }
}

/// Weights and decay parameters for one score computation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HotnessConfig {
    pub like_weight: f64,
    pub comment_weight: f64,
    pub view_weight: f64,

    /// Time-decay exponent
    pub gravity: f64,

    /// Smoothing offset added to post age; always > 0 so the divisor is never zero
    pub base_hours: f64,
}

impl Default for HotnessConfig {
    fn default() -> Self {
        Self {
            like_weight: DEFAULT_LIKE_WEIGHT,
            comment_weight: DEFAULT_COMMENT_WEIGHT,
            view_weight: DEFAULT_VIEW_WEIGHT,
            gravity: DEFAULT_GRAVITY,
            base_hours: DEFAULT_BASE_HOURS,
        }
    }
}

impl HotnessConfig {
    /// Defaults with the patch's supplied fields laid over them
    pub fn merged(patch: Option<&HotnessConfigPatch>) -> Self {
        let mut config = Self::default();
        if let Some(patch) = patch {
            patch.apply_to(&mut config);
        }
        config
    }
}

/// Caller-supplied partial configuration
///
/// Only the fields that are `Some` override the defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HotnessConfigPatch {
    pub like_weight: Option<f64>,
    pub comment_weight: Option<f64>,
    pub view_weight: Option<f64>,
    pub gravity: Option<f64>,
    pub base_hours: Option<f64>,
}

impl HotnessConfigPatch {
    pub fn apply_to(&self, config: &mut HotnessConfig) {
        if let Some(v) = self.like_weight {
            config.like_weight = v;
        }
        if let Some(v) = self.comment_weight {
            config.comment_weight = v;
        }
        if let Some(v) = self.view_weight {
            config.view_weight = v;
        }
        if let Some(v) = self.gravity {
            config.gravity = v;
        }
        if let Some(v) = self.base_hours {
            config.base_hours = v;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Raw inputs and intermediate values behind a score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HotnessFactors {
    pub like_count: u64,
    pub comment_count: u64,
    pub view_count: u64,
    pub age_in_hours: f64,
    pub engagement_score: f64,
    pub time_factor: f64,
}

/// Result of scoring a single post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HotnessOutcome {
    pub post_id: PostId,
    pub score: f64,

    /// Score stored on the post before this computation
    pub previous_score: f64,

    pub factors: HotnessFactors,
}

/// A post that could not be scored during a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchFailure {
    pub post_id: PostId,
    pub reason: String,
}

/// Partial-success report for batch scoring
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub results: Vec<HotnessOutcome>,
    pub failed: Vec<BatchFailure>,
}

/// Ranked listing entry with author metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HotPost {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<User>,
}

/// Score movement observed by a single recomputation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HotnessTrend {
    pub post_id: PostId,
    pub current_score: f64,
    pub previous_score: f64,
    pub change: f64,

    /// Relative change in percent; 0 when the previous score was 0
    pub percentage: f64,
}

/// Every violated constraint of a configuration, not just the first
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Post storage collaborator
///
/// Abstracts over storage backends. Methods take `&self` so one instance can be
/// shared between request handlers, the scoring service, and the coordinator.
#[async_trait::async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert or replace a post
    async fn store_post(&self, post: Post) -> Result<(), StorageError>;

    /// Retrieve a post by ID, deleted or not
    async fn get_post(&self, id: PostId) -> Result<Option<Post>, StorageError>;

    /// All non-deleted posts, newest first
    async fn list_active_posts(&self) -> Result<Vec<Post>, StorageError>;

    /// IDs of all non-deleted posts, newest first
    async fn list_active_post_ids(&self) -> Result<Vec<PostId>, StorageError> {
        Ok(self
            .list_active_posts()
            .await?
            .into_iter()
            .map(|post| post.id)
            .collect())
    }

    /// Write only the `hotness_score` field of a post
    async fn update_hotness_score(&self, id: PostId, score: f64) -> Result<(), StorageError>;

    /// Insert or replace a user
    async fn store_user(&self, user: User) -> Result<(), StorageError>;

    /// Look up authors for a set of IDs; unknown IDs are simply absent
    async fn get_users(&self, ids: &[UserId]) -> Result<HashMap<UserId, User>, StorageError>;
}
