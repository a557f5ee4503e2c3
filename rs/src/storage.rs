//! Post storage implementations
//!
//! `FileStorage` keeps one JSON file per post and per user and serves listings
//! from an in-memory cache. Post files are also written by the forum that owns
//! the counters, so single-post reads and score writes go to disk.
//! `MemoryStorage` holds the same data in process only.

use crate::models::{Post, PostId, PostRepository, User, UserId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

const POSTS_DIR: &str = "posts";
const USERS_DIR: &str = "users";

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Post not found: {id}")]
    PostNotFound { id: PostId },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage directory error: {message}")]
    Directory { message: String },
}

#[derive(Default)]
struct Records {
    posts: HashMap<PostId, Post>,
    users: HashMap<UserId, User>,
}

impl Records {
    fn active_posts(&self) -> Vec<Post> {
        let mut posts: Vec<Post> = self
            .posts
            .values()
            .filter(|post| !post.is_deleted)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
    }

    fn users_for(&self, ids: &[UserId]) -> HashMap<UserId, User> {
        ids.iter()
            .filter_map(|id| self.users.get(id).map(|user| (*id, user.clone())))
            .collect()
    }
}

/// File-based storage implementation
///
/// Layout: `<root>/posts/<uuid>.json` and `<root>/users/<uuid>.json`.
pub struct FileStorage {
    /// Base directory for storage
    storage_dir: PathBuf,

    /// In-memory cache of all records
    cache: RwLock<Records>,

    /// Whether the cache has been loaded
    cache_loaded: RwLock<bool>,
}

impl FileStorage {
    /// Create a new file storage instance
    ///
    /// The storage directories will be created if they don't exist.
    pub async fn new<P: AsRef<Path>>(storage_dir: P) -> Result<Self, StorageError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        if !storage_dir.exists() {
            fs::create_dir_all(&storage_dir).await?;
        }

        let metadata = fs::metadata(&storage_dir).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Directory {
                message: format!("{} is not a directory", storage_dir.display()),
            });
        }

        fs::create_dir_all(storage_dir.join(POSTS_DIR)).await?;
        fs::create_dir_all(storage_dir.join(USERS_DIR)).await?;

        Ok(Self {
            storage_dir,
            cache: RwLock::new(Records::default()),
            cache_loaded: RwLock::new(false),
        })
    }

    fn post_path(&self, id: PostId) -> PathBuf {
        self.storage_dir.join(POSTS_DIR).join(format!("{id}.json"))
    }

    fn user_path(&self, id: UserId) -> PathBuf {
        self.storage_dir.join(USERS_DIR).join(format!("{id}.json"))
    }

    /// Load all records into cache if not already loaded
    async fn ensure_cache_loaded(&self) -> Result<(), StorageError> {
        let cache_loaded = *self.cache_loaded.read().await;
        if cache_loaded {
            return Ok(());
        }

        let mut cache = self.cache.write().await;
        let mut cache_loaded_guard = self.cache_loaded.write().await;

        // Double-check in case another task loaded while we were waiting
        if *cache_loaded_guard {
            return Ok(());
        }

        tracing::info!("Loading posts from {}", self.storage_dir.display());
        let start = std::time::Instant::now();

        let posts: Vec<Post> = load_records(&self.storage_dir.join(POSTS_DIR)).await?;
        let users: Vec<User> = load_records(&self.storage_dir.join(USERS_DIR)).await?;
        let (post_count, user_count) = (posts.len(), users.len());

        for post in posts {
            cache.posts.insert(post.id, post);
        }
        for user in users {
            cache.users.insert(user.id, user);
        }

        tracing::info!(
            "Loaded {} posts and {} users in {:?}",
            post_count,
            user_count,
            start.elapsed()
        );

        *cache_loaded_guard = true;
        Ok(())
    }

    /// Current on-disk copy of a post; `None` if its file is gone
    async fn read_post_file(&self, id: PostId) -> Result<Option<Post>, StorageError> {
        match fs::read_to_string(self.post_path(id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_post_to_file(&self, post: &Post) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(post)?;
        fs::write(self.post_path(post.id), content).await?;
        Ok(())
    }

    async fn save_user_to_file(&self, user: &User) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(user)?;
        fs::write(self.user_path(user.id), content).await?;
        Ok(())
    }
}

/// Read every `<uuid>.json` file in `dir`, skipping files that fail to parse
async fn load_records<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
    let mut entries = fs::read_dir(dir).await?;
    let mut records = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }

        let is_uuid = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.parse::<uuid::Uuid>().is_ok());
        if !is_uuid {
            continue;
        }

        let parsed = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(StorageError::from),
            Err(e) => Err(e.into()),
        };
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Failed to load record from {}: {}", path.display(), e),
        }
    }

    Ok(records)
}

#[async_trait::async_trait]
impl PostRepository for FileStorage {
    async fn store_post(&self, post: Post) -> Result<(), StorageError> {
        self.ensure_cache_loaded().await?;
        self.save_post_to_file(&post).await?;

        let mut cache = self.cache.write().await;
        cache.posts.insert(post.id, post);
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>, StorageError> {
        self.ensure_cache_loaded().await?;
        let mut cache = self.cache.write().await;

        let post = self.read_post_file(id).await?;
        match &post {
            Some(post) => cache.posts.insert(id, post.clone()),
            None => cache.posts.remove(&id),
        };
        Ok(post)
    }

    async fn list_active_posts(&self) -> Result<Vec<Post>, StorageError> {
        self.ensure_cache_loaded().await?;
        let cache = self.cache.read().await;
        Ok(cache.active_posts())
    }

    async fn update_hotness_score(&self, id: PostId, score: f64) -> Result<(), StorageError> {
        self.ensure_cache_loaded().await?;
        // Held across the read-modify-write so local score writers serialize
        let mut cache = self.cache.write().await;

        let Some(mut post) = self.read_post_file(id).await? else {
            cache.posts.remove(&id);
            return Err(StorageError::PostNotFound { id });
        };

        post.hotness_score = score;
        self.save_post_to_file(&post).await?;
        cache.posts.insert(id, post);

        Ok(())
    }

    async fn store_user(&self, user: User) -> Result<(), StorageError> {
        self.ensure_cache_loaded().await?;
        self.save_user_to_file(&user).await?;

        let mut cache = self.cache.write().await;
        cache.users.insert(user.id, user);
        Ok(())
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<HashMap<UserId, User>, StorageError> {
        self.ensure_cache_loaded().await?;
        let cache = self.cache.read().await;
        Ok(cache.users_for(ids))
    }
}

/// In-process storage with no persistence
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<Records>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PostRepository for MemoryStorage {
    async fn store_post(&self, post: Post) -> Result<(), StorageError> {
        self.records.write().await.posts.insert(post.id, post);
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>, StorageError> {
        Ok(self.records.read().await.posts.get(&id).cloned())
    }

    async fn list_active_posts(&self) -> Result<Vec<Post>, StorageError> {
        Ok(self.records.read().await.active_posts())
    }

    async fn update_hotness_score(&self, id: PostId, score: f64) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        let post = records
            .posts
            .get_mut(&id)
            .ok_or(StorageError::PostNotFound { id })?;
        post.hotness_score = score;
        Ok(())
    }

    async fn store_user(&self, user: User) -> Result<(), StorageError> {
        self.records.write().await.users.insert(user.id, user);
        Ok(())
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<HashMap<UserId, User>, StorageError> {
        Ok(self.records.read().await.users_for(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn create_test_storage() -> (FileStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).await.unwrap();
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).await;
        assert!(storage.is_ok());
        assert!(temp_dir.path().join(POSTS_DIR).is_dir());
        assert!(temp_dir.path().join(USERS_DIR).is_dir());
    }

    #[tokio::test]
    async fn test_storage_rejects_file_path() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not-a-dir");
        std::fs::write(&file_path, "x").unwrap();

        let result = FileStorage::new(&file_path).await;
        assert!(matches!(result, Err(StorageError::Directory { .. })));
    }

    #[tokio::test]
    async fn test_store_and_retrieve_post() {
        let (storage, _temp_dir) = create_test_storage().await;

        let post = Post::new(Uuid::new_v4(), "First post").with_engagement(1, 2, 3);
        let id = post.id;

        storage.store_post(post.clone()).await.unwrap();

        let retrieved = storage.get_post(id).await.unwrap();
        assert_eq!(retrieved, Some(post));
        assert!(storage.get_post(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_hotness_score_touches_only_score() {
        let (storage, _temp_dir) = create_test_storage().await;

        let post = Post::new(Uuid::new_v4(), "Scored").with_engagement(4, 5, 6);
        let id = post.id;
        storage.store_post(post.clone()).await.unwrap();

        storage.update_hotness_score(id, 12.5).await.unwrap();

        let updated = storage.get_post(id).await.unwrap().unwrap();
        assert_eq!(updated.hotness_score, 12.5);
        assert_eq!(updated.like_count, 4);
        assert_eq!(updated.title, post.title);
        assert_eq!(updated.created_at, post.created_at);
    }

    #[tokio::test]
    async fn test_update_nonexistent_post() {
        let (storage, _temp_dir) = create_test_storage().await;

        let result = storage.update_hotness_score(Uuid::new_v4(), 1.0).await;
        assert!(matches!(result, Err(StorageError::PostNotFound { .. })));
    }

    #[tokio::test]
    async fn test_active_posts_exclude_deleted_newest_first() {
        let (storage, _temp_dir) = create_test_storage().await;
        let author = Uuid::new_v4();
        let now = Utc::now();

        let mut older = Post::new(author, "older");
        older.created_at = now - Duration::hours(5);
        let mut newer = Post::new(author, "newer");
        newer.created_at = now - Duration::hours(1);
        let mut deleted = Post::new(author, "deleted");
        deleted.is_deleted = true;

        for post in [older.clone(), newer.clone(), deleted] {
            storage.store_post(post).await.unwrap();
        }

        let ids = storage.list_active_post_ids().await.unwrap();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_users_lookup() {
        let (storage, _temp_dir) = create_test_storage().await;

        let alice = User::new("alice");
        storage.store_user(alice.clone()).await.unwrap();

        let missing = Uuid::new_v4();
        let users = storage.get_users(&[alice.id, missing]).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[&alice.id], alice);
    }

    #[tokio::test]
    async fn test_file_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let post = Post::new(Uuid::new_v4(), "Persistent post").with_engagement(7, 0, 0);
        let id = post.id;

        {
            let storage = FileStorage::new(temp_dir.path()).await.unwrap();
            storage.store_post(post.clone()).await.unwrap();
            storage.update_hotness_score(id, 3.25).await.unwrap();
        }

        {
            let storage = FileStorage::new(temp_dir.path()).await.unwrap();
            let retrieved = storage.get_post(id).await.unwrap().unwrap();
            assert_eq!(retrieved.hotness_score, 3.25);
            assert_eq!(retrieved.like_count, 7);
        }
    }

    #[tokio::test]
    async fn test_score_write_keeps_counters_from_other_writer() {
        let temp_dir = TempDir::new().unwrap();
        let owner = FileStorage::new(temp_dir.path()).await.unwrap();
        let scorer = FileStorage::new(temp_dir.path()).await.unwrap();

        let post = Post::new(Uuid::new_v4(), "Shared").with_engagement(1, 0, 0);
        let id = post.id;
        owner.store_post(post.clone()).await.unwrap();
        assert_eq!(scorer.list_active_posts().await.unwrap().len(), 1);

        owner
            .store_post(post.with_engagement(50, 2, 10))
            .await
            .unwrap();

        let seen = scorer.get_post(id).await.unwrap().unwrap();
        assert_eq!(seen.like_count, 50);

        scorer.update_hotness_score(id, 9.0).await.unwrap();

        let reopened = FileStorage::new(temp_dir.path()).await.unwrap();
        let on_disk = reopened.get_post(id).await.unwrap().unwrap();
        assert_eq!(on_disk.hotness_score, 9.0);
        assert_eq!(on_disk.like_count, 50);
        assert_eq!(on_disk.comment_count, 2);
        assert_eq!(on_disk.view_count, 10);

        // The scorer's cache picked up the refreshed record
        let listed = scorer.list_active_posts().await.unwrap();
        assert_eq!(listed[0].like_count, 50);
        assert_eq!(listed[0].hotness_score, 9.0);
    }

    #[tokio::test]
    async fn test_score_write_for_externally_removed_post() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).await.unwrap();

        let post = Post::new(Uuid::new_v4(), "Short-lived");
        let id = post.id;
        storage.store_post(post).await.unwrap();
        std::fs::remove_file(temp_dir.path().join(POSTS_DIR).join(format!("{id}.json"))).unwrap();

        let result = storage.update_hotness_score(id, 1.0).await;
        assert!(matches!(result, Err(StorageError::PostNotFound { .. })));
        assert!(storage.get_post(id).await.unwrap().is_none());
        assert!(storage.list_active_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_files_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let post = Post::new(Uuid::new_v4(), "Good post");

        {
            let storage = FileStorage::new(temp_dir.path()).await.unwrap();
            storage.store_post(post.clone()).await.unwrap();
        }

        let bad = temp_dir
            .path()
            .join(POSTS_DIR)
            .join(format!("{}.json", Uuid::new_v4()));
        std::fs::write(bad, "{ not json").unwrap();

        let storage = FileStorage::new(temp_dir.path()).await.unwrap();
        let posts = storage.list_active_posts().await.unwrap();
        assert_eq!(posts, vec![post]);
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        let post = Post::new(Uuid::new_v4(), "In memory");
        let id = post.id;

        storage.store_post(post).await.unwrap();
        storage.update_hotness_score(id, 2.0).await.unwrap();

        assert_eq!(storage.get_post(id).await.unwrap().unwrap().hotness_score, 2.0);
        assert_eq!(storage.list_active_post_ids().await.unwrap(), vec![id]);
        assert!(storage.update_hotness_score(Uuid::new_v4(), 1.0).await.is_err());
    }
}
