//! In-memory repository adapters
//!
//! Drop-in replacements for the SQLite store, used by tests and by callers
//! that want a throwaway calendar. They honour the same contract as
//! [`crate::db::Database`], record how often they were called, and can be told
//! to fail or to stall to simulate an unreachable store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Result, SchedcastError, StorageError};
use crate::repository::{ConnectionRegistry, PostRepository};
use crate::types::{Connection, NewConnection, PostDraft, PostUpdate, ScheduledPost};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Behaviour knobs for [`MemoryPostRepository`]
#[derive(Debug, Clone, Default)]
pub struct MemoryRepoConfig {
    /// Reject every `create_post` with this storage message
    pub create_error: Option<String>,

    /// Reject every `update_post` with this storage message
    pub update_error: Option<String>,

    /// Latency added before each read and each write
    pub delay: Duration,
}

/// Post repository backed by a `HashMap`
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryPostRepository {
    config: MemoryRepoConfig,
    posts: Arc<Mutex<HashMap<String, ScheduledPost>>>,
    create_calls: Arc<Mutex<usize>>,
    applied_updates: Arc<Mutex<Vec<(String, PostUpdate)>>>,
    list_error: Arc<Mutex<Option<String>>>,
}

impl MemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryRepoConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// A repository whose writes are all refused
    pub fn failing_creates(message: &str) -> Self {
        Self::with_config(MemoryRepoConfig {
            create_error: Some(message.to_string()),
            ..Default::default()
        })
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self::with_config(MemoryRepoConfig {
            delay,
            ..Default::default()
        })
    }

    /// Seed a post directly, bypassing `create_post`
    pub fn insert(&self, post: ScheduledPost) {
        lock(&self.posts).insert(post.id.clone(), post);
    }

    /// Make `list_posts` fail with this storage message from now on, or
    /// succeed again with `None`. Shared by all clones.
    pub fn fail_lists(&self, message: Option<&str>) {
        *lock(&self.list_error) = message.map(str::to_string);
    }

    pub fn create_call_count(&self) -> usize {
        *lock(&self.create_calls)
    }

    /// Updates that were applied, in the order the repository applied them
    pub fn applied_updates(&self) -> Vec<(String, PostUpdate)> {
        lock(&self.applied_updates).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.posts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn list_posts(&self, owner_id: &str) -> Result<Vec<ScheduledPost>> {
        self.simulate_latency().await;

        if let Some(message) = lock(&self.list_error).clone() {
            return Err(StorageError::Unavailable(message).into());
        }
        Ok(lock(&self.posts)
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn get_post(&self, id: &str) -> Result<ScheduledPost> {
        self.simulate_latency().await;
        lock(&self.posts)
            .get(id)
            .cloned()
            .ok_or_else(|| SchedcastError::post_not_found(id))
    }

    async fn create_post(&self, owner_id: &str, draft: PostDraft) -> Result<ScheduledPost> {
        *lock(&self.create_calls) += 1;
        self.simulate_latency().await;

        if let Some(message) = &self.config.create_error {
            return Err(StorageError::Unavailable(message.clone()).into());
        }

        let post = ScheduledPost::from_draft(owner_id, draft);
        lock(&self.posts).insert(post.id.clone(), post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: &str, update: PostUpdate) -> Result<ScheduledPost> {
        self.simulate_latency().await;

        if let Some(message) = &self.config.update_error {
            return Err(StorageError::Unavailable(message.clone()).into());
        }

        // Read-modify-write under one lock so each update is atomic
        let mut posts = lock(&self.posts);
        let post = posts
            .get_mut(id)
            .ok_or_else(|| SchedcastError::post_not_found(id))?;
        post.apply(&update)?;
        let updated = post.clone();
        drop(posts);

        lock(&self.applied_updates).push((id.to_string(), update));
        Ok(updated)
    }

    async fn delete_post(&self, id: &str) -> Result<()> {
        self.simulate_latency().await;
        lock(&self.posts)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedcastError::post_not_found(id))
    }
}

/// Connection registry backed by a `Vec`
#[derive(Clone, Default)]
pub struct MemoryConnectionRegistry {
    connections: Arc<Mutex<Vec<Connection>>>,
}

impl MemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a connection with a known id
    pub fn insert(&self, connection: Connection) {
        lock(&self.connections).push(connection);
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryConnectionRegistry {
    async fn list_connections(&self, owner_id: &str) -> Result<Vec<Connection>> {
        let mut connections: Vec<Connection> = lock(&self.connections)
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        connections.sort_by_key(|c| c.created_at);
        Ok(connections)
    }

    async fn create_connection(&self, owner_id: &str, new: NewConnection) -> Result<Connection> {
        let connection = Connection::new(owner_id, new);
        lock(&self.connections).push(connection.clone());
        Ok(connection)
    }

    async fn delete_connection(&self, id: &str) -> Result<()> {
        let mut connections = lock(&self.connections);
        let before = connections.len();
        connections.retain(|c| c.id != id);

        if connections.len() == before {
            return Err(SchedcastError::connection_not_found(id));
        }
        Ok(())
    }
}
