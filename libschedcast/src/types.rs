//! Core types for Schedcast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Result, SchedcastError};

/// Target network for a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            _ => Err(format!(
                "Invalid platform: '{}'. Valid options: facebook, instagram",
                s
            )),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a scheduled post
///
/// `Scheduled` is the only non-terminal state. Every other state is reached
/// from `Scheduled` exactly once and never left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Published,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PostStatus::Scheduled)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Only a `scheduled` post can change status; terminal states are final.
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        matches!((self, next), (PostStatus::Scheduled, _))
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            "cancelled" => Ok(PostStatus::Cancelled),
            _ => Err(format!(
                "Invalid status: '{}'. Valid options: scheduled, published, failed, cancelled",
                s
            )),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A content item bound to a delivery instant and a connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledPost {
    pub id: String,
    pub owner_id: String,
    pub connection_id: String,
    pub platform: Platform,
    pub image_url: String,
    #[serde(default)]
    pub caption: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: PostStatus,
    pub external_post_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledPost {
    /// Build a fresh `scheduled` post from a draft with a generated id
    pub fn from_draft(owner_id: &str, draft: PostDraft) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            connection_id: draft.connection_id,
            platform: draft.platform,
            image_url: draft.image_url,
            caption: draft.caption,
            scheduled_at: draft.scheduled_at,
            status: PostStatus::Scheduled,
            external_post_id: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a partial update, enforcing the lifecycle invariants.
    ///
    /// Nothing is modified when the update is rejected.
    pub fn apply(&mut self, update: &PostUpdate) -> Result<()> {
        if update.scheduled_at.is_some() && self.status.is_terminal() {
            return Err(SchedcastError::Validation(format!(
                "post {} is {} and can no longer be moved",
                self.id, self.status
            )));
        }

        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(SchedcastError::Validation(format!(
                    "post {} cannot move from {} to {}",
                    self.id, self.status, next
                )));
            }
        }

        if let (Some(existing), Some(incoming)) =
            (self.external_post_id.as_deref(), update.external_post_id.as_deref())
        {
            if existing != incoming {
                return Err(SchedcastError::Validation(format!(
                    "post {} already has external id {}",
                    self.id, existing
                )));
            }
        }

        if let Some(scheduled_at) = update.scheduled_at {
            self.scheduled_at = scheduled_at;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(external_post_id) = &update.external_post_id {
            self.external_post_id = Some(external_post_id.clone());
        }

        Ok(())
    }
}

/// Fields supplied when creating a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostDraft {
    pub connection_id: String,
    pub platform: Platform,
    pub image_url: String,
    #[serde(default)]
    pub caption: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Partial update of a post; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostUpdate {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<PostStatus>,
    pub external_post_id: Option<String>,
}

impl PostUpdate {
    pub fn scheduled_at(scheduled_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at: Some(scheduled_at),
            ..Default::default()
        }
    }

    pub fn status(status: PostStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn external_post_id(external_post_id: impl Into<String>) -> Self {
        Self {
            external_post_id: Some(external_post_id.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled_at.is_none() && self.status.is_none() && self.external_post_id.is_none()
    }
}

/// A stored authorization for one account on one platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub id: String,
    pub owner_id: String,
    pub platform: Platform,
    /// Display name, e.g. page name or handle
    pub account_label: String,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewConnection {
    pub platform: Platform,
    pub account_label: String,
    pub scope: Option<String>,
}

impl Connection {
    pub fn new(owner_id: &str, new: NewConnection) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            platform: new.platform,
            account_label: new.account_label,
            scope: new.scope,
            created_at: Utc::now(),
        }
    }
}
