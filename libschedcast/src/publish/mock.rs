//! Scripted publish service for tests
//!
//! Simulates the outcomes the orchestrator has to handle (accepted with or
//! without an external id, transport failure, rejection, slow responses) and
//! records every request it receives.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{DispatchError, Result, SchedcastError};
use crate::publish::{PublishRequest, PublishResponse, PublishService};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How the mock answers
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Accept; the external id is `"{prefix}-{post id}"`
    Accept { id_prefix: Option<String> },
    Network(String),
    Timeout,
    Reject { status: u16, message: String },
    Unauthorized(String),
}

#[derive(Debug, Clone)]
pub struct MockPublisherConfig {
    pub outcome: MockOutcome,
    pub delay: Duration,
    /// Token the mock expects; any token is accepted when `None`
    pub expected_token: Option<String>,
}

impl Default for MockPublisherConfig {
    fn default() -> Self {
        Self {
            outcome: MockOutcome::Accept {
                id_prefix: Some("ext".to_string()),
            },
            delay: Duration::from_millis(0),
            expected_token: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockPublisher {
    config: MockPublisherConfig,
    calls: Arc<Mutex<Vec<PublishRequest>>>,
}

impl MockPublisher {
    pub fn new(config: MockPublisherConfig) -> Self {
        Self {
            config,
            calls: Arc::default(),
        }
    }

    /// Accepts everything and returns `ext-{post id}`
    pub fn success() -> Self {
        Self::default()
    }

    /// Accepts everything but reports no external id
    pub fn without_external_id() -> Self {
        Self::new(MockPublisherConfig {
            outcome: MockOutcome::Accept { id_prefix: None },
            ..Default::default()
        })
    }

    pub fn network_failure(message: &str) -> Self {
        Self::new(MockPublisherConfig {
            outcome: MockOutcome::Network(message.to_string()),
            ..Default::default()
        })
    }

    pub fn timeout() -> Self {
        Self::new(MockPublisherConfig {
            outcome: MockOutcome::Timeout,
            ..Default::default()
        })
    }

    pub fn rejection(status: u16, message: &str) -> Self {
        Self::new(MockPublisherConfig {
            outcome: MockOutcome::Reject {
                status,
                message: message.to_string(),
            },
            ..Default::default()
        })
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(MockPublisherConfig {
            outcome: MockOutcome::Unauthorized(message.to_string()),
            ..Default::default()
        })
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockPublisherConfig {
            delay,
            ..Default::default()
        })
    }

    /// Accepts only requests carrying `token`
    pub fn expecting_token(token: &str) -> Self {
        Self::new(MockPublisherConfig {
            expected_token: Some(token.to_string()),
            ..Default::default()
        })
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<PublishRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PublishService for MockPublisher {
    async fn publish(
        &self,
        token: &SecretString,
        request: &PublishRequest,
    ) -> Result<PublishResponse> {
        lock(&self.calls).push(request.clone());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(expected) = &self.config.expected_token {
            if token.expose_secret() != expected {
                return Err(DispatchError::Authentication("unexpected bearer token".to_string()).into());
            }
        }

        match &self.config.outcome {
            MockOutcome::Accept { id_prefix } => Ok(PublishResponse {
                external_post_id: id_prefix
                    .as_ref()
                    .map(|prefix| format!("{}-{}", prefix, request.idempotency_key)),
            }),
            MockOutcome::Network(message) => Err(DispatchError::Network(message.clone()).into()),
            MockOutcome::Timeout => {
                Err(DispatchError::Timeout("mock publish service timed out".to_string()).into())
            }
            MockOutcome::Reject { status, message } => Err(SchedcastError::RemoteRejection {
                status: *status,
                message: message.clone(),
            }),
            MockOutcome::Unauthorized(message) => {
                Err(DispatchError::Authentication(message.clone()).into())
            }
        }
    }
}
