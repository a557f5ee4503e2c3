//! Integration tests for the hotness crate
//!
//! These exercise file-backed storage, the scoring service, and the real-time
//! coordinator together, the way a forum backend would wire them up.

use chrono::{Duration, Utc};
use hotness::{
    CoordinatorConfig, FileStorage, HotnessConfigPatch, HotnessService, HotnessUpdateService,
    Post, PostRepository, Priority, TriggerKind, UpdateTrigger, User,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;
use uuid::Uuid;

async fn setup() -> (HotnessService, Arc<FileStorage>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::new(temp_dir.path()).await.unwrap());
    let service = HotnessService::new(storage.clone());
    (service, storage, temp_dir)
}

fn post_by(author: &User, title: &str, age_hours: i64, likes: u64, comments: u64, views: u64) -> Post {
    let mut post = Post::new(author.id, title).with_engagement(likes, comments, views);
    post.created_at = Utc::now() - Duration::hours(age_hours);
    post
}

/// Full sweep followed by a ranked listing with authors joined in
#[tokio::test]
async fn test_sweep_and_rank() {
    let (service, storage, _temp_dir) = setup().await;

    let alice = User::new("alice");
    let bob = User::new("bob");
    assert_ok!(storage.store_user(alice.clone()).await);
    assert_ok!(storage.store_user(bob.clone()).await);

    // Same engagement, different ages: the younger post must rank higher
    let fresh = post_by(&alice, "fresh", 1, 10, 5, 100);
    let stale = post_by(&bob, "stale", 48, 10, 5, 100);
    let quiet = post_by(&alice, "quiet", 1, 0, 0, 0);
    let mut removed = post_by(&bob, "removed", 1, 50, 50, 500);
    removed.is_deleted = true;

    for post in [&fresh, &stale, &quiet, &removed] {
        assert_ok!(storage.store_post(post.clone()).await);
    }

    let report = service.update_all_active_posts_hotness(None).await.unwrap();
    assert_eq!(report.results.len(), 3);
    assert!(report.failed.is_empty());

    let hot = service.get_hot_posts(10, 0.0).await.unwrap();
    let titles: Vec<&str> = hot.iter().map(|p| p.post.title.as_str()).collect();
    assert_eq!(titles, vec!["fresh", "stale", "quiet"]);
    assert_eq!(hot[0].author.as_ref().map(|u| u.username.as_str()), Some("alice"));
    assert_eq!(hot[1].author.as_ref().map(|u| u.username.as_str()), Some("bob"));
    assert_eq!(hot[2].post.hotness_score, 0.0);

    let above_zero = service.get_hot_posts(10, 0.001).await.unwrap();
    assert_eq!(above_zero.len(), 2);

    let last_day = service.get_hot_posts_by_time_range(24, 10).await.unwrap();
    let titles: Vec<&str> = last_day.iter().map(|p| p.post.title.as_str()).collect();
    assert_eq!(titles, vec!["fresh", "quiet"]);
}

/// Scores written by the coordinator survive a storage reopen
#[tokio::test]
async fn test_coordinator_persists_through_file_storage() {
    let (service, storage, temp_dir) = setup().await;
    let author = User::new("carol");
    let post = post_by(&author, "discussed", 2, 4, 2, 30);
    let post_id = post.id;
    assert_ok!(storage.store_post(post).await);

    let coordinator = HotnessUpdateService::new(
        service,
        CoordinatorConfig {
            update_delay_ms: 60_000,
            ..Default::default()
        },
    );

    let view = coordinator.on_post_view(post_id, None).await;
    assert!(view.success && !view.immediate);

    let comment = coordinator
        .on_post_comment(post_id, author.id, Uuid::new_v4())
        .await;
    assert!(comment.success && comment.immediate);
    assert_eq!(coordinator.get_queue_status().await.pending_posts, 0);

    let reopened = FileStorage::new(temp_dir.path()).await.unwrap();
    let stored = reopened.get_post(post_id).await.unwrap().unwrap();
    assert!(stored.hotness_score > 0.0);

    coordinator.reset().await;
}

/// Custom-priority triggers and the queue status report
#[tokio::test]
async fn test_queue_status_and_flush() {
    let (service, storage, _temp_dir) = setup().await;
    let author = User::new("dave");
    let first = post_by(&author, "first", 1, 1, 0, 0);
    let second = post_by(&author, "second", 1, 0, 1, 0);
    assert_ok!(storage.store_post(first.clone()).await);
    assert_ok!(storage.store_post(second.clone()).await);

    let coordinator = HotnessUpdateService::new(
        service,
        CoordinatorConfig {
            update_delay_ms: 60_000,
            ..Default::default()
        },
    );

    coordinator.on_post_view(first.id, None).await;
    coordinator.on_post_like(first.id, author.id, true).await;
    let urgent_view = UpdateTrigger::new(TriggerKind::View, second.id).with_priority(Priority::High);
    let outcome = coordinator.trigger_update(urgent_view).await;
    assert!(outcome.immediate);

    let status = coordinator.get_queue_status().await;
    assert_eq!(status.pending_posts, 1);
    assert_eq!(status.total_triggers, 2);
    assert_eq!(status.posts[0].post_id, first.id);
    assert_eq!(status.posts[0].kinds, vec![TriggerKind::Like, TriggerKind::View]);
    assert!(status.timer_armed);

    let flushed = coordinator.shutdown().await;
    assert_eq!(flushed.processed, 1);
    assert_eq!(flushed.failed, 0);

    let stored = storage.get_post(first.id).await.unwrap().unwrap();
    assert!(stored.hotness_score > 0.0);
}

/// Config overrides are validated and applied by the service
#[tokio::test]
async fn test_config_override_changes_score() {
    let (service, storage, _temp_dir) = setup().await;
    let author = User::new("erin");
    let post = post_by(&author, "views only", 0, 0, 0, 100);
    let post_id = post.id;
    assert_ok!(storage.store_post(post).await);

    let default = service.calculate_post_hotness(post_id, None).await.unwrap();

    let patch = HotnessConfigPatch {
        view_weight: Some(1.0),
        ..Default::default()
    };
    let boosted = service.calculate_post_hotness(post_id, Some(&patch)).await.unwrap();
    assert_eq!(boosted.previous_score, default.score);
    assert!(boosted.score > default.score * 9.0);

    let invalid = HotnessConfigPatch {
        view_weight: Some(11.0),
        gravity: Some(9.0),
        ..Default::default()
    };
    let err = service
        .calculate_post_hotness(post_id, Some(&invalid))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("view_weight"));
    assert!(message.contains("gravity"));
}
