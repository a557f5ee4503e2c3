//! Hotness scoring
//!
//! A post's hotness is its weighted engagement divided by a time factor that
//! grows with age:
//!
//! ```text
//! engagement = likes * like_weight + comments * comment_weight + views * view_weight
//! time_factor = (age_in_hours + base_hours) ^ gravity
//! hotness = engagement / time_factor
//! ```

use crate::constants::{
    BASE_HOURS_RANGE, COMMENT_WEIGHT_RANGE, GRAVITY_RANGE, LIKE_WEIGHT_RANGE,
    MAX_HOT_POSTS_LIMIT, MAX_TIME_RANGE_HOURS, VIEW_WEIGHT_RANGE,
};
use crate::models::{
    BatchFailure, BatchReport, ConfigValidation, HotPost, HotnessConfig, HotnessConfigPatch,
    HotnessFactors, HotnessOutcome, HotnessTrend, Post, PostId, PostRepository, UserId,
};
use crate::storage::StorageError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors surfaced by the scoring service
#[derive(Error, Debug)]
pub enum HotnessError {
    #[error("Post not found: {id}")]
    NotFound { id: PostId },

    #[error("Post {id} is deleted; hotness is not computed")]
    Deleted { id: PostId },

    #[error("Invalid parameters: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Compute a post's hotness at `now` without touching storage
pub fn compute_hotness(
    post: &Post,
    config: &HotnessConfig,
    now: DateTime<Utc>,
) -> (f64, HotnessFactors) {
    let age_in_hours = post.age_in_hours(now);
    let time_factor = (age_in_hours + config.base_hours).powf(config.gravity);

    let engagement_score = post.like_count as f64 * config.like_weight
        + post.comment_count as f64 * config.comment_weight
        + post.view_count as f64 * config.view_weight;

    let factors = HotnessFactors {
        like_count: post.like_count,
        comment_count: post.comment_count,
        view_count: post.view_count,
        age_in_hours,
        engagement_score,
        time_factor,
    };

    (engagement_score / time_factor, factors)
}

/// Check a partial configuration against the documented bounds
///
/// Reports every violated field so callers can show all problems at once.
pub fn validate_config(patch: &HotnessConfigPatch) -> ConfigValidation {
    let checks = [
        ("like_weight", patch.like_weight, LIKE_WEIGHT_RANGE),
        ("comment_weight", patch.comment_weight, COMMENT_WEIGHT_RANGE),
        ("view_weight", patch.view_weight, VIEW_WEIGHT_RANGE),
        ("gravity", patch.gravity, GRAVITY_RANGE),
        ("base_hours", patch.base_hours, BASE_HOURS_RANGE),
    ];

    let errors: Vec<String> = checks
        .into_iter()
        .filter_map(|(field, value, (min, max))| {
            let value = value?;
            (!(min..=max).contains(&value))
                .then(|| format!("{field} must be between {min} and {max} (got {value})"))
        })
        .collect();

    ConfigValidation {
        valid: errors.is_empty(),
        errors,
    }
}

fn resolve_config(patch: Option<&HotnessConfigPatch>) -> Result<HotnessConfig, HotnessError> {
    if let Some(patch) = patch {
        let validation = validate_config(patch);
        if !validation.valid {
            return Err(HotnessError::Validation(validation.errors));
        }
    }
    Ok(HotnessConfig::merged(patch))
}

fn validate_limit(limit: usize, errors: &mut Vec<String>) {
    if !(1..=MAX_HOT_POSTS_LIMIT).contains(&limit) {
        errors.push(format!(
            "limit must be between 1 and {MAX_HOT_POSTS_LIMIT} (got {limit})"
        ));
    }
}

/// Scores posts and serves ranked listings
#[derive(Clone)]
pub struct HotnessService {
    repo: Arc<dyn PostRepository>,
}

impl HotnessService {
    pub fn new(repo: Arc<dyn PostRepository>) -> Self {
        Self { repo }
    }

    /// Recompute and persist one post's hotness
    ///
    /// `patch` is merged over the default configuration.
    pub async fn calculate_post_hotness(
        &self,
        post_id: PostId,
        patch: Option<&HotnessConfigPatch>,
    ) -> Result<HotnessOutcome, HotnessError> {
        let config = resolve_config(patch)?;
        self.score_and_store(post_id, &config, Utc::now()).await
    }

    async fn score_and_store(
        &self,
        post_id: PostId,
        config: &HotnessConfig,
        now: DateTime<Utc>,
    ) -> Result<HotnessOutcome, HotnessError> {
        let post = self
            .repo
            .get_post(post_id)
            .await
            .inspect_err(|e| error!(post_id = %post_id, "Failed to load post: {}", e))?
            .ok_or(HotnessError::NotFound { id: post_id })?;

        if post.is_deleted {
            debug!(post_id = %post_id, "Skipping hotness for deleted post");
            return Err(HotnessError::Deleted { id: post_id });
        }

        let (score, factors) = compute_hotness(&post, config, now);

        match self.repo.update_hotness_score(post_id, score).await {
            Ok(()) => {}
            // Removed between the read and the write
            Err(StorageError::PostNotFound { id }) => return Err(HotnessError::NotFound { id }),
            Err(e) => {
                error!(post_id = %post_id, "Failed to persist hotness score: {}", e);
                return Err(e.into());
            }
        }

        debug!(
            post_id = %post_id,
            score,
            previous = post.hotness_score,
            "Updated hotness score"
        );

        Ok(HotnessOutcome {
            post_id,
            score,
            previous_score: post.hotness_score,
            factors,
        })
    }

    /// Score many posts concurrently, collecting per-post failures
    pub async fn batch_update_hotness(
        &self,
        post_ids: &[PostId],
        patch: Option<&HotnessConfigPatch>,
    ) -> Result<BatchReport, HotnessError> {
        let config = resolve_config(patch)?;
        if post_ids.is_empty() {
            return Ok(BatchReport::default());
        }

        let now = Utc::now();
        let handles: Vec<_> = post_ids
            .iter()
            .map(|&post_id| {
                let service = self.clone();
                let handle =
                    tokio::spawn(async move { service.score_and_store(post_id, &config, now).await });
                (post_id, handle)
            })
            .collect();

        let mut report = BatchReport::default();
        for (post_id, handle) in handles {
            let reason = match handle.await {
                Ok(Ok(outcome)) => {
                    report.results.push(outcome);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("Scoring task failed: {e}"),
            };
            report.failed.push(BatchFailure { post_id, reason });
        }

        if !report.failed.is_empty() {
            warn!(
                failed = report.failed.len(),
                succeeded = report.results.len(),
                "Batch hotness update had failures"
            );
        }

        Ok(report)
    }

    /// Rescore every non-deleted post, newest first
    pub async fn update_all_active_posts_hotness(
        &self,
        patch: Option<&HotnessConfigPatch>,
    ) -> Result<BatchReport, HotnessError> {
        let post_ids = self
            .repo
            .list_active_post_ids()
            .await
            .inspect_err(|e| error!("Failed to list active posts: {}", e))?;

        info!(count = post_ids.len(), "Recomputing hotness for all active posts");
        let report = self.batch_update_hotness(&post_ids, patch).await?;
        info!(
            updated = report.results.len(),
            failed = report.failed.len(),
            "Full hotness sweep complete"
        );

        Ok(report)
    }

    /// Highest-scoring active posts at or above `min_score`
    pub async fn get_hot_posts(
        &self,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<HotPost>, HotnessError> {
        let mut errors = Vec::new();
        validate_limit(limit, &mut errors);
        if !(min_score >= 0.0 && min_score.is_finite()) {
            errors.push(format!("min_score must be a non-negative number (got {min_score})"));
        }
        if !errors.is_empty() {
            return Err(HotnessError::Validation(errors));
        }

        let posts = self.load_active_posts().await?;
        let posts = posts
            .into_iter()
            .filter(|post| post.hotness_score >= min_score)
            .collect();

        self.rank_and_join(posts, limit).await
    }

    /// Highest-scoring active posts created within the last `hours`
    pub async fn get_hot_posts_by_time_range(
        &self,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<HotPost>, HotnessError> {
        let mut errors = Vec::new();
        if !(1..=MAX_TIME_RANGE_HOURS).contains(&hours) {
            errors.push(format!(
                "hours must be between 1 and {MAX_TIME_RANGE_HOURS} (got {hours})"
            ));
        }
        validate_limit(limit, &mut errors);
        if !errors.is_empty() {
            return Err(HotnessError::Validation(errors));
        }

        let since = Utc::now() - Duration::hours(i64::from(hours));
        let posts = self.load_active_posts().await?;
        let posts = posts
            .into_iter()
            .filter(|post| post.created_at >= since)
            .collect();

        self.rank_and_join(posts, limit).await
    }

    /// Recompute a post and report how far its score moved
    pub async fn calculate_hotness_trend(
        &self,
        post_id: PostId,
        patch: Option<&HotnessConfigPatch>,
    ) -> Result<HotnessTrend, HotnessError> {
        let outcome = self.calculate_post_hotness(post_id, patch).await?;

        let change = outcome.score - outcome.previous_score;
        let percentage = if outcome.previous_score == 0.0 {
            0.0
        } else {
            change / outcome.previous_score * 100.0
        };

        Ok(HotnessTrend {
            post_id,
            current_score: outcome.score,
            previous_score: outcome.previous_score,
            change,
            percentage,
        })
    }

    async fn load_active_posts(&self) -> Result<Vec<Post>, HotnessError> {
        Ok(self
            .repo
            .list_active_posts()
            .await
            .inspect_err(|e| error!("Failed to load posts for ranking: {}", e))?)
    }

    async fn rank_and_join(
        &self,
        mut posts: Vec<Post>,
        limit: usize,
    ) -> Result<Vec<HotPost>, HotnessError> {
        posts.sort_by(|a, b| {
            b.hotness_score
                .total_cmp(&a.hotness_score)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        posts.truncate(limit);

        let mut author_ids: Vec<UserId> = posts.iter().map(|post| post.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let authors = self
            .repo
            .get_users(&author_ids)
            .await
            .inspect_err(|e| error!("Failed to load post authors: {}", e))?;

        Ok(posts
            .into_iter()
            .map(|post| {
                let author = authors.get(&post.author_id).cloned();
                HotPost { post, author }
            })
            .collect())
    }
}
