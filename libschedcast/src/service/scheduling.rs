//! Scheduling orchestrator
//!
//! Creating a post is a two-phase workflow:
//!
//! 1. validate the request and **persist** the post locally (`scheduled`)
//! 2. **dispatch** it to the publish service and reconcile the external id
//!
//! The two phases are not atomic. When dispatch fails the persisted record is
//! kept as is (no rollback) and the error is returned; the post can be
//! dispatched again later with [`SchedulingService::retry_dispatch`]. The
//! publish service receives the post id as idempotency key, so a retry after
//! an ambiguous failure cannot create a duplicate.

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::events::{Event, EventBus};
use crate::calendar::first_of_month;
use crate::error::{DispatchError, Result, SchedcastError};
use crate::identity::IdentityProvider;
use crate::publish::{PublishRequest, PublishResponse, PublishService};
use crate::repository::{ConnectionRegistry, PostRepository};
use crate::types::{Connection, Platform, PostDraft, PostStatus, PostUpdate, ScheduledPost};

/// Everything needed to schedule one post
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub owner_id: String,
    pub connection_id: String,
    pub platform: Platform,
    pub image_url: String,
    pub caption: String,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}

/// Delivery result reported back by the platform
///
/// Settling only changes the status. The external id is owned by dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Published,
    Failed,
}

/// Calendar posts keyed by local day
pub type PostsByDay = BTreeMap<NaiveDate, Vec<ScheduledPost>>;

#[derive(Clone)]
pub struct SchedulingService {
    posts: Arc<dyn PostRepository>,
    connections: Arc<dyn ConnectionRegistry>,
    publisher: Arc<dyn PublishService>,
    identity: Arc<dyn IdentityProvider>,
    timezone: Tz,
    event_bus: EventBus,
}

impl SchedulingService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        connections: Arc<dyn ConnectionRegistry>,
        publisher: Arc<dyn PublishService>,
        identity: Arc<dyn IdentityProvider>,
        timezone: Tz,
        event_bus: EventBus,
    ) -> Self {
        Self {
            posts,
            connections,
            publisher,
            identity,
            timezone,
            event_bus,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Validate, persist and dispatch a new post
    ///
    /// Returns the stored post, including the external id when the publish
    /// service reported one.
    ///
    /// # Errors
    ///
    /// - `Validation` before anything is stored (empty image URL, unknown
    ///   connection, platform mismatch)
    /// - `Storage` if the post could not be persisted
    /// - `Dispatch` / `RemoteRejection` if dispatch failed; the post stays
    ///   stored in `scheduled` state without an external id
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<ScheduledPost> {
        self.validate(&request).await?;

        let draft = PostDraft {
            connection_id: request.connection_id,
            platform: request.platform,
            image_url: request.image_url.trim().to_string(),
            caption: request.caption,
            scheduled_at: request.scheduled_at,
        };
        let post = self.posts.create_post(&request.owner_id, draft).await?;

        info!(
            post_id = %post.id,
            platform = %post.platform,
            scheduled_at = %post.scheduled_at,
            "post scheduled"
        );
        self.event_bus.emit(Event::PostScheduled {
            post_id: post.id.clone(),
            connection_id: post.connection_id.clone(),
            platform: post.platform,
            scheduled_at: post.scheduled_at,
        });

        self.dispatch(post).await
    }

    /// Dispatch an already stored post again
    ///
    /// A post that already carries an external id is returned unchanged
    /// without contacting the publish service.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the post does not exist
    /// - `Validation` if the post is no longer `scheduled`
    /// - `Dispatch` / `RemoteRejection` if dispatch failed again
    pub async fn retry_dispatch(&self, post_id: &str) -> Result<ScheduledPost> {
        let post = self.posts.get_post(post_id).await?;

        if post.external_post_id.is_some() {
            info!(post_id = %post.id, "post already dispatched, nothing to retry");
            return Ok(post);
        }
        if post.status != PostStatus::Scheduled {
            return Err(SchedcastError::Validation(format!(
                "post {} is {} and cannot be dispatched",
                post.id, post.status
            )));
        }

        self.dispatch(post).await
    }

    async fn validate(&self, request: &ScheduleRequest) -> Result<()> {
        if request.image_url.trim().is_empty() {
            return Err(SchedcastError::Validation(
                "image URL is required".to_string(),
            ));
        }

        let connections = self.connections.list_connections(&request.owner_id).await?;
        let connection = connections
            .iter()
            .find(|c| c.id == request.connection_id)
            .ok_or_else(|| {
                SchedcastError::Validation(format!(
                    "connection {} is not connected for this account",
                    request.connection_id
                ))
            })?;

        if connection.platform != request.platform {
            return Err(SchedcastError::Validation(format!(
                "connection {} ({}) is a {} account, not {}",
                connection.id, connection.account_label, connection.platform, request.platform
            )));
        }

        Ok(())
    }

    async fn dispatch(&self, post: ScheduledPost) -> Result<ScheduledPost> {
        let request = PublishRequest::for_post(&post);

        let response = match self.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "dispatch failed, post kept as scheduled");
                self.event_bus.emit(Event::DispatchFailed {
                    post_id: post.id.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let reconciled = match &response.external_post_id {
            Some(external_post_id) => {
                info!(post_id = %post.id, external_post_id = %external_post_id, "post dispatched");
                self.posts
                    .update_post(&post.id, PostUpdate::external_post_id(external_post_id.clone()))
                    .await
                    .map_err(|e| {
                        warn!(post_id = %post.id, error = %e, "could not record external id");
                        e
                    })?
            }
            None => {
                info!(post_id = %post.id, "post dispatched without external id");
                post
            }
        };

        self.event_bus.emit(Event::DispatchSucceeded {
            post_id: reconciled.id.clone(),
            external_post_id: response.external_post_id,
        });
        Ok(reconciled)
    }

    async fn send(&self, request: &PublishRequest) -> Result<PublishResponse> {
        if !self.publisher.is_configured() {
            return Err(DispatchError::NotConfigured(format!(
                "no [publish] endpoint in config; post {} was saved but not dispatched",
                request.idempotency_key
            ))
            .into());
        }

        let token = self.identity.bearer_token().await?;
        self.publisher.publish(&token, request).await
    }

    /// Connections an owner can schedule to, optionally for one platform
    pub async fn eligible_connections(
        &self,
        owner_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<Connection>> {
        let connections = self.connections.list_connections(owner_id).await?;
        Ok(connections
            .into_iter()
            .filter(|c| platform.map_or(true, |p| c.platform == p))
            .collect())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<ScheduledPost> {
        self.posts.get_post(post_id).await
    }

    /// All posts of an owner, earliest first
    pub async fn list_posts(&self, owner_id: &str) -> Result<Vec<ScheduledPost>> {
        let mut posts = self.posts.list_posts(owner_id).await?;
        posts.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(owner_id, count = posts.len(), "listed posts");
        Ok(posts)
    }

    /// Posts falling in the month of `date`, grouped by local day
    pub async fn posts_in_month(&self, owner_id: &str, date: NaiveDate) -> Result<PostsByDay> {
        let month = first_of_month(date);
        let mut by_day = PostsByDay::new();

        for post in self.list_posts(owner_id).await? {
            let day = post.scheduled_at.with_timezone(&self.timezone).date_naive();
            if first_of_month(day) == month {
                by_day.entry(day).or_default().push(post);
            }
        }
        Ok(by_day)
    }

    /// Move a scheduled post to `cancelled`
    ///
    /// Cancelling an already cancelled post returns it unchanged.
    pub async fn cancel_post(&self, post_id: &str) -> Result<ScheduledPost> {
        let post = self.settle(post_id, PostStatus::Cancelled).await?;
        info!(post_id, "post cancelled");
        Ok(post)
    }

    /// Settle a post once the platform reports delivery
    ///
    /// Reporting the outcome a post already has returns it unchanged.
    pub async fn record_outcome(
        &self,
        post_id: &str,
        outcome: DeliveryOutcome,
    ) -> Result<ScheduledPost> {
        let status = match outcome {
            DeliveryOutcome::Published => PostStatus::Published,
            DeliveryOutcome::Failed => PostStatus::Failed,
        };

        let post = self.settle(post_id, status).await?;
        info!(post_id, status = %post.status, "delivery outcome recorded");
        Ok(post)
    }

    /// Move a post to a terminal status, emitting an event only on change
    async fn settle(&self, post_id: &str, status: PostStatus) -> Result<ScheduledPost> {
        let current = self.posts.get_post(post_id).await?;
        if current.status == status {
            debug!(post_id, %status, "status unchanged");
            return Ok(current);
        }

        // A concurrent settle of the same post loses here: terminal states
        // accept no further status writes.
        let post = self
            .posts
            .update_post(post_id, PostUpdate::status(status))
            .await?;
        self.event_bus.emit(Event::PostStatusChanged {
            post_id: post.id.clone(),
            status: post.status,
        });
        Ok(post)
    }

    /// Permanently remove a post
    ///
    /// Confirmation is the caller's job. Deleting the same id twice fails
    /// with `NotFound`.
    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        self.posts.delete_post(post_id).await?;
        info!(post_id, "post deleted");
        self.event_bus.emit(Event::PostDeleted {
            post_id: post_id.to_string(),
        });
        Ok(())
    }
}
