//! Publish service client
//!
//! Delivery is delegated to an external publishing service: once a post is
//! stored locally it is *dispatched*, i.e. handed to that service together with
//! a bearer credential. The service queues it for the platform and may answer
//! with the platform's id for the post.
//!
//! Adapters:
//! - [`http::HttpPublisher`]: JSON over HTTPS (`reqwest`)
//! - [`mock::MockPublisher`]: scripted outcomes for tests
//! - [`UnconfiguredPublisher`]: refuses every dispatch; used when the config
//!   has no `[publish]` section so posts can still be planned offline

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::types::{Platform, ScheduledPost};

pub mod http;
pub mod mock;

/// Body of a dispatch call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub connection_id: String,
    pub image_url: String,
    pub caption: String,
    pub scheduled_at: DateTime<Utc>,
    pub platform: Platform,

    /// Sent as the `Idempotency-Key` header, not in the body
    #[serde(skip)]
    pub idempotency_key: String,
}

impl PublishRequest {
    /// Dispatch payload for a stored post, keyed by the post id
    pub fn for_post(post: &ScheduledPost) -> Self {
        Self {
            connection_id: post.connection_id.clone(),
            image_url: post.image_url.clone(),
            caption: post.caption.clone(),
            scheduled_at: post.scheduled_at,
            platform: post.platform,
            idempotency_key: post.id.clone(),
        }
    }
}

/// What the publish service answered on success
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    #[serde(default)]
    pub external_post_id: Option<String>,
}

#[async_trait]
pub trait PublishService: Send + Sync {
    /// Hand a post to the publishing service
    ///
    /// # Errors
    ///
    /// - `DispatchError::Authentication` if the credential is refused
    /// - `DispatchError::Network` / `DispatchError::Timeout` on transport failure
    /// - `SchedcastError::RemoteRejection` if the service refuses the request
    async fn publish(&self, token: &SecretString, request: &PublishRequest)
        -> Result<PublishResponse>;

    /// Whether there is a service to dispatch to at all
    fn is_configured(&self) -> bool {
        true
    }
}

/// Publisher used when no endpoint is configured
pub struct UnconfiguredPublisher;

#[async_trait]
impl PublishService for UnconfiguredPublisher {
    async fn publish(
        &self,
        _token: &SecretString,
        request: &PublishRequest,
    ) -> Result<PublishResponse> {
        Err(DispatchError::NotConfigured(format!(
            "no [publish] endpoint in config; post {} was saved but not dispatched",
            request.idempotency_key
        ))
        .into())
    }

    fn is_configured(&self) -> bool {
        false
    }
}
