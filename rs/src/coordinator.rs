//! Real-time hotness update coordination
//!
//! User actions arrive as [`UpdateTrigger`]s. Triggers are queued per post and
//! flushed either immediately (high priority, or too many pending for one post)
//! or by a single process-wide debounce timer that services up to
//! `batch_update_size` posts per tick.
//!
//! One coordinator is meant to exist per process. Construct it at startup and
//! hand clones to whatever needs to report engagement; clones share one queue.

use crate::constants::{
    DEFAULT_BATCH_UPDATE_SIZE, DEFAULT_UPDATE_DELAY_MS, DEFAULT_UPDATE_THRESHOLD,
};
use crate::hotness::HotnessService;
use crate::models::{PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Kind of user interaction behind a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Like,
    Comment,
    View,
}

impl TriggerKind {
    /// Priority used by the `on_post_*` helpers
    pub fn default_priority(self) -> Priority {
        match self {
            TriggerKind::Comment => Priority::High,
            TriggerKind::Like => Priority::Medium,
            TriggerKind::View => Priority::Low,
        }
    }
}

/// Trigger priority; ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// One user interaction that may warrant a score recompute
///
/// Triggers live only in memory and are lost on restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTrigger {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    pub post_id: PostId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,

    /// For likes: `true` for a like, `false` for an unlike
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<Uuid>,
}

impl UpdateTrigger {
    /// Trigger stamped now with the kind's default priority
    pub fn new(kind: TriggerKind, post_id: PostId) -> Self {
        Self {
            kind,
            post_id,
            user_id: None,
            priority: kind.default_priority(),
            timestamp: Utc::now(),
            liked: None,
            comment_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Coordinator-wide settings, mutable at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// When false, triggers are dropped rather than queued
    pub real_time_enabled: bool,

    /// Pending triggers for one post that force an immediate flush
    pub update_threshold: usize,

    /// Maximum posts serviced per debounced batch
    pub batch_update_size: usize,

    /// Debounce window in milliseconds
    pub update_delay_ms: u64,

    /// Triggers at or above this priority skip the debounce window
    pub priority_threshold: Priority,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            real_time_enabled: true,
            update_threshold: DEFAULT_UPDATE_THRESHOLD,
            batch_update_size: DEFAULT_BATCH_UPDATE_SIZE,
            update_delay_ms: DEFAULT_UPDATE_DELAY_MS,
            priority_threshold: Priority::High,
        }
    }
}

impl CoordinatorConfig {
    pub fn update_delay(&self) -> Duration {
        Duration::from_millis(self.update_delay_ms)
    }
}

/// Partial update for [`CoordinatorConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfigPatch {
    pub real_time_enabled: Option<bool>,
    pub update_threshold: Option<usize>,
    pub batch_update_size: Option<usize>,
    pub update_delay_ms: Option<u64>,
    pub priority_threshold: Option<Priority>,
}

impl CoordinatorConfigPatch {
    fn apply_to(&self, config: &mut CoordinatorConfig) {
        if let Some(v) = self.real_time_enabled {
            config.real_time_enabled = v;
        }
        if let Some(v) = self.update_threshold {
            config.update_threshold = v;
        }
        if let Some(v) = self.batch_update_size {
            config.batch_update_size = v;
        }
        if let Some(v) = self.update_delay_ms {
            config.update_delay_ms = v;
        }
        if let Some(v) = self.priority_threshold {
            config.priority_threshold = v;
        }
    }
}

/// Result of submitting one trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub success: bool,

    /// Whether the post was recomputed before returning
    pub immediate: bool,

    pub message: String,
}

impl TriggerOutcome {
    fn deferred(message: impl Into<String>) -> Self {
        Self {
            success: true,
            immediate: false,
            message: message.into(),
        }
    }
}

/// Aggregate counts for a flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
}

/// Queue introspection for one pending post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPostStatus {
    pub post_id: PostId,
    pub trigger_count: usize,
    pub kinds: Vec<TriggerKind>,
}

/// Snapshot of the pending queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending_posts: usize,
    pub total_triggers: usize,

    /// Oldest-enqueued first
    pub posts: Vec<PendingPostStatus>,

    pub timer_armed: bool,
}

struct PendingEntry {
    /// Enqueue order of the entry's first trigger
    seq: u64,
    triggers: Vec<UpdateTrigger>,
}

struct ArmedTimer {
    id: u64,
    handle: JoinHandle<()>,

    /// Set while the timer task is servicing a batch it already drained
    in_flight: bool,
}

#[derive(Default)]
struct QueueState {
    /// A post is present iff it has at least one unflushed trigger
    pending: HashMap<PostId, PendingEntry>,
    next_seq: u64,
    timer: Option<ArmedTimer>,
    next_timer_id: u64,
}

impl QueueState {
    fn push(&mut self, trigger: UpdateTrigger) -> usize {
        let seq = self.next_seq;
        let entry = self
            .pending
            .entry(trigger.post_id)
            .or_insert_with(|| PendingEntry {
                seq,
                triggers: Vec::new(),
            });
        if entry.seq == seq {
            self.next_seq += 1;
        }
        entry.triggers.push(trigger);
        entry.triggers.len()
    }

    /// Remove up to `limit` posts, oldest first
    fn take_oldest(&mut self, limit: usize) -> Vec<(PostId, Vec<UpdateTrigger>)> {
        let mut order: Vec<(u64, PostId)> = self
            .pending
            .iter()
            .map(|(post_id, entry)| (entry.seq, *post_id))
            .collect();
        order.sort_unstable();

        order
            .into_iter()
            .take(limit)
            .filter_map(|(_, post_id)| {
                self.pending
                    .remove(&post_id)
                    .map(|entry| (post_id, entry.triggers))
            })
            .collect()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    /// Mark the timer `id` busy or idle; false if it is no longer the armed timer
    fn mark_in_flight(&mut self, id: u64, in_flight: bool) -> bool {
        match self.timer.as_mut() {
            Some(timer) if timer.id == id => {
                timer.in_flight = in_flight;
                true
            }
            _ => false,
        }
    }
}

struct Inner {
    scorer: HotnessService,
    config: RwLock<CoordinatorConfig>,
    state: Mutex<QueueState>,
}

/// Debounced, priority-aware scheduler for hotness recomputation
///
/// Never returns errors: per-post failures are logged and counted so that a
/// hotness problem cannot break the user action that caused it.
#[derive(Clone)]
pub struct HotnessUpdateService {
    inner: Arc<Inner>,
}

impl HotnessUpdateService {
    pub fn new(scorer: HotnessService, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                scorer,
                config: RwLock::new(config),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Queue a trigger, flushing its post right away if it is urgent enough
    pub async fn trigger_update(&self, trigger: UpdateTrigger) -> TriggerOutcome {
        let config = self.get_config().await;
        if !config.real_time_enabled {
            return TriggerOutcome::deferred("Real-time updates are disabled; trigger dropped");
        }

        let post_id = trigger.post_id;
        let priority = trigger.priority;

        let drained = {
            let mut state = self.inner.state.lock().await;
            let pending = state.push(trigger);
            debug!(post_id = %post_id, ?priority, pending, "Queued hotness trigger");

            if priority >= config.priority_threshold || pending >= config.update_threshold {
                state.pending.remove(&post_id).map(|entry| entry.triggers)
            } else {
                self.arm_timer(&mut state, config.update_delay());
                None
            }
        };

        match drained {
            Some(triggers) => {
                if self.process_post_update(post_id, &triggers).await {
                    TriggerOutcome {
                        success: true,
                        immediate: true,
                        message: format!("Hotness updated from {} trigger(s)", triggers.len()),
                    }
                } else {
                    TriggerOutcome {
                        success: false,
                        immediate: true,
                        message: "Immediate hotness update failed".to_string(),
                    }
                }
            }
            None => TriggerOutcome::deferred("Hotness update scheduled"),
        }
    }

    /// Report a like (`liked = true`) or unlike (`liked = false`)
    pub async fn on_post_like(
        &self,
        post_id: PostId,
        user_id: UserId,
        liked: bool,
    ) -> TriggerOutcome {
        let mut trigger = UpdateTrigger::new(TriggerKind::Like, post_id).with_user(Some(user_id));
        trigger.liked = Some(liked);
        self.dispatch(trigger).await
    }

    pub async fn on_post_comment(
        &self,
        post_id: PostId,
        user_id: UserId,
        comment_id: Uuid,
    ) -> TriggerOutcome {
        let mut trigger =
            UpdateTrigger::new(TriggerKind::Comment, post_id).with_user(Some(user_id));
        trigger.comment_id = Some(comment_id);
        self.dispatch(trigger).await
    }

    pub async fn on_post_view(&self, post_id: PostId, user_id: Option<UserId>) -> TriggerOutcome {
        let trigger = UpdateTrigger::new(TriggerKind::View, post_id).with_user(user_id);
        self.dispatch(trigger).await
    }

    /// Submit a trigger without waiting for it
    ///
    /// For request handlers that must not hold their response on scoring.
    pub fn dispatch_detached(&self, trigger: UpdateTrigger) -> JoinHandle<TriggerOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.dispatch(trigger).await })
    }

    /// Boundary between engagement mutations and the queue: failures stop here
    async fn dispatch(&self, trigger: UpdateTrigger) -> TriggerOutcome {
        let (post_id, kind) = (trigger.post_id, trigger.kind);
        let outcome = self.trigger_update(trigger).await;
        if !outcome.success {
            warn!(post_id = %post_id, ?kind, "Hotness trigger failed: {}", outcome.message);
        }
        outcome
    }

    /// Service up to `batch_update_size` pending posts, oldest first
    pub async fn process_batch_updates(&self) -> BatchOutcome {
        let batch_size = self.inner.config.read().await.batch_update_size.max(1);
        let batch = self.inner.state.lock().await.take_oldest(batch_size);
        self.process_drained(batch).await
    }

    /// Service every pending post regardless of batch size
    pub async fn process_all_pending(&self) -> BatchOutcome {
        let batch = {
            let mut state = self.inner.state.lock().await;
            let count = state.pending.len();
            state.take_oldest(count)
        };
        self.process_drained(batch).await
    }

    async fn process_drained(&self, batch: Vec<(PostId, Vec<UpdateTrigger>)>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if batch.is_empty() {
            return outcome;
        }

        for (post_id, triggers) in &batch {
            if self.process_post_update(*post_id, triggers).await {
                outcome.processed += 1;
            } else {
                outcome.failed += 1;
            }
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            "Processed hotness batch"
        );
        outcome
    }

    /// Recompute one post with the default configuration
    async fn process_post_update(&self, post_id: PostId, triggers: &[UpdateTrigger]) -> bool {
        match self.inner.scorer.calculate_post_hotness(post_id, None).await {
            Ok(outcome) => {
                debug!(
                    post_id = %post_id,
                    triggers = triggers.len(),
                    score = outcome.score,
                    "Recomputed hotness"
                );
                true
            }
            Err(e) => {
                warn!(
                    post_id = %post_id,
                    triggers = triggers.len(),
                    "Hotness recompute failed: {}",
                    e
                );
                false
            }
        }
    }

    /// Arm the shared debounce timer unless one is already pending
    fn arm_timer(&self, state: &mut QueueState, delay: Duration) {
        if state.timer.is_some() {
            return;
        }

        let id = state.next_timer_id;
        state.next_timer_id += 1;

        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_timer(id, delay).await });
        state.timer = Some(ArmedTimer {
            id,
            handle,
            in_flight: false,
        });
        debug!(delay_ms = delay.as_millis() as u64, "Armed hotness debounce timer");
    }

    async fn run_timer(&self, id: u64, mut delay: Duration) {
        loop {
            tokio::time::sleep(delay).await;

            let batch_size = self.inner.config.read().await.batch_update_size.max(1);
            let batch = {
                let mut state = self.inner.state.lock().await;
                if !state.mark_in_flight(id, true) {
                    return;
                }
                state.take_oldest(batch_size)
            };
            self.process_drained(batch).await;

            let config = self.get_config().await;
            let mut state = self.inner.state.lock().await;
            if !state.mark_in_flight(id, false) {
                return;
            }

            // Posts beyond the batch size wait for another tick
            if state.pending.is_empty() || !config.real_time_enabled {
                state.timer = None;
                return;
            }
            delay = config.update_delay();
        }
    }

    /// Snapshot of what is waiting to be flushed
    pub async fn get_queue_status(&self) -> QueueStatus {
        let state = self.inner.state.lock().await;

        let mut entries: Vec<(&PostId, &PendingEntry)> = state.pending.iter().collect();
        entries.sort_unstable_by_key(|(_, entry)| entry.seq);

        let posts: Vec<PendingPostStatus> = entries
            .into_iter()
            .map(|(post_id, entry)| {
                let mut kinds: Vec<TriggerKind> =
                    entry.triggers.iter().map(|trigger| trigger.kind).collect();
                kinds.sort_unstable();
                kinds.dedup();
                PendingPostStatus {
                    post_id: *post_id,
                    trigger_count: entry.triggers.len(),
                    kinds,
                }
            })
            .collect();

        QueueStatus {
            pending_posts: posts.len(),
            total_triggers: posts.iter().map(|post| post.trigger_count).sum(),
            posts,
            timer_armed: state.timer.is_some(),
        }
    }

    /// Drop triggers older than `max_age`, returning how many were pruned
    pub async fn cleanup_expired_triggers(&self, max_age: chrono::Duration) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            warn!(
                max_age_secs = max_age.num_seconds(),
                "Trigger max age out of range; nothing pruned"
            );
            return 0;
        };
        let mut state = self.inner.state.lock().await;

        let mut pruned = 0;
        state.pending.retain(|_, entry| {
            let before = entry.triggers.len();
            entry.triggers.retain(|trigger| trigger.timestamp >= cutoff);
            pruned += before - entry.triggers.len();
            !entry.triggers.is_empty()
        });

        if pruned > 0 {
            info!(pruned, "Pruned expired hotness triggers");
        }
        pruned
    }

    /// Periodically prune expired triggers until the handle is aborted
    pub fn spawn_maintenance(&self, interval: Duration, max_age: chrono::Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Hotness maintenance loop started");
            loop {
                tokio::time::sleep(interval).await;
                this.cleanup_expired_triggers(max_age).await;
            }
        })
    }

    /// Apply a partial config; takes effect on the next scheduling decision
    pub async fn update_config(&self, patch: &CoordinatorConfigPatch) -> CoordinatorConfig {
        let mut config = self.inner.config.write().await;
        patch.apply_to(&mut config);
        info!(config = ?*config, "Updated hotness coordinator config");
        config.clone()
    }

    pub async fn get_config(&self) -> CoordinatorConfig {
        self.inner.config.read().await.clone()
    }

    /// Clear all pending triggers and cancel the timer
    pub async fn reset(&self) {
        let mut state = self.inner.state.lock().await;
        state.cancel_timer();
        state.pending.clear();
        state.next_seq = 0;
    }

    /// Stop the timer and flush everything still queued
    ///
    /// A sleeping timer is cancelled. A timer partway through a batch is
    /// allowed to finish that batch first, so no drained trigger is dropped.
    /// The returned counts cover only the final flush.
    pub async fn shutdown(&self) -> BatchOutcome {
        let busy_timer = {
            let mut state = self.inner.state.lock().await;
            match state.timer.take() {
                Some(timer) if timer.in_flight => Some(timer.handle),
                Some(timer) => {
                    timer.handle.abort();
                    None
                }
                None => None,
            }
        };

        if let Some(handle) = busy_timer {
            debug!("Waiting for in-flight hotness batch");
            if let Err(e) = handle.await {
                warn!("Hotness timer task ended abnormally: {}", e);
            }
        }

        let outcome = self.process_all_pending().await;
        info!("Hotness coordinator shut down");
        outcome
    }
}
