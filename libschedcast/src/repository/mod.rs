//! Storage contracts for posts and connections
//!
//! The services never talk to SQLite directly. They hold an
//! `Arc<dyn PostRepository>` and an `Arc<dyn ConnectionRegistry>`, so the
//! SQLite adapter ([`crate::db::Database`]) and the in-memory adapters in
//! [`memory`] are interchangeable.
//!
//! Every operation is atomic for a single record. Nothing here spans records,
//! and nothing cascades: deleting a connection leaves posts that reference it
//! untouched.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Connection, NewConnection, PostDraft, PostUpdate, ScheduledPost};

// In-memory adapters are available for all builds (not just tests) to support integration tests
pub mod memory;

/// Persistent store of scheduled posts
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// All posts of an owner, in no particular order
    async fn list_posts(&self, owner_id: &str) -> Result<Vec<ScheduledPost>>;

    /// Fetch one post
    ///
    /// # Errors
    ///
    /// `SchedcastError::NotFound` if no post has this id.
    async fn get_post(&self, id: &str) -> Result<ScheduledPost>;

    /// Persist a new post in `scheduled` state
    ///
    /// The repository generates the id and `created_at`. Callers are expected
    /// to have validated the draft; the repository only rejects writes it
    /// cannot store.
    ///
    /// # Errors
    ///
    /// `SchedcastError::Storage` if the write is rejected or the store is
    /// unreachable.
    async fn create_post(&self, owner_id: &str, draft: PostDraft) -> Result<ScheduledPost>;

    /// Apply a partial update and return the stored result
    ///
    /// Status may only move forward and `external_post_id` may only be set
    /// once (see [`ScheduledPost::apply`]).
    ///
    /// # Errors
    ///
    /// - `SchedcastError::NotFound` if the post does not exist (including a
    ///   post deleted concurrently)
    /// - `SchedcastError::Validation` if the update breaks a lifecycle rule
    /// - `SchedcastError::Storage` on write failure
    async fn update_post(&self, id: &str, update: PostUpdate) -> Result<ScheduledPost>;

    /// Permanently remove a post
    ///
    /// # Errors
    ///
    /// `SchedcastError::NotFound` if the post does not exist, so a second
    /// delete of the same id fails.
    async fn delete_post(&self, id: &str) -> Result<()>;
}

/// Persistent store of platform-account connections
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// All connections of an owner, oldest first
    async fn list_connections(&self, owner_id: &str) -> Result<Vec<Connection>>;

    /// Register the outcome of an external authorization flow
    async fn create_connection(&self, owner_id: &str, new: NewConnection) -> Result<Connection>;

    /// Remove a connection without touching posts that reference it
    ///
    /// # Errors
    ///
    /// `SchedcastError::NotFound` if the connection does not exist.
    async fn delete_connection(&self, id: &str) -> Result<()>;
}
