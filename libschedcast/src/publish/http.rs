//! HTTP publish service adapter

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::config::PublishConfig;
use crate::error::{from_reqwest, ConfigError, DispatchError, Result, SchedcastError};
use crate::publish::{PublishRequest, PublishResponse, PublishService};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Publisher that POSTs JSON to a configured endpoint
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "publish.endpoint".to_string(),
                reason: format!("'{}' is not an http(s) URL", endpoint),
            }
            .into());
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PublishService for HttpPublisher {
    async fn publish(
        &self,
        token: &SecretString,
        request: &PublishRequest,
    ) -> Result<PublishResponse> {
        tracing::debug!(
            endpoint = %self.endpoint,
            post_id = %request.idempotency_key,
            platform = %request.platform,
            "dispatching post"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.expose_secret())
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let body = resp.text().await.map_err(from_reqwest)?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DispatchError::Authentication(format!(
                "HTTP {} - {}",
                status.as_u16(),
                error_message(&body, status)
            ))
            .into());
        }

        if !status.is_success() {
            return Err(SchedcastError::RemoteRejection {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        parse_success_body(&body)
    }
}

/// Decode a 2xx body; an empty body means "accepted, no id yet"
fn parse_success_body(body: &str) -> Result<PublishResponse> {
    if body.trim().is_empty() {
        return Ok(PublishResponse::default());
    }
    serde_json::from_str(body).map_err(|e| {
        DispatchError::InvalidResponse(format!("could not decode success body: {}", e)).into()
    })
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => return s.clone(),
                // {"error": {"message": "..."}}
                Some(serde_json::Value::Object(inner)) => {
                    if let Some(serde_json::Value::String(s)) = inner.get("message") {
                        return s.clone();
                    }
                }
                _ => {}
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_endpoint() {
        let result = HttpPublisher::new("ftp://publish.example.com", Duration::from_secs(5));
        assert!(matches!(
            result,
            Err(SchedcastError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = PublishConfig {
            endpoint: "https://publish.example.com/v1/posts".to_string(),
            timeout_secs: 10,
            token_env: "SCHEDCAST_TOKEN".to_string(),
        };
        let publisher = HttpPublisher::from_config(&config).unwrap();
        assert_eq!(publisher.endpoint(), "https://publish.example.com/v1/posts");
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        let msg = error_message(
            r#"{"error":"image too large","message":"ignored"}"#,
            StatusCode::UNPROCESSABLE_ENTITY,
        );
        assert_eq!(msg, "image too large");
    }

    #[test]
    fn test_error_message_falls_back_to_message_field() {
        let msg = error_message(r#"{"message":"quota exceeded"}"#, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(msg, "quota exceeded");
    }

    #[test]
    fn test_error_message_nested_object() {
        let msg = error_message(
            r#"{"error":{"code":17,"message":"connection expired"}}"#,
            StatusCode::BAD_REQUEST,
        );
        assert_eq!(msg, "connection expired");
    }

    #[test]
    fn test_error_message_raw_body_and_empty_body() {
        assert_eq!(
            error_message("  upstream unavailable \n", StatusCode::BAD_GATEWAY),
            "upstream unavailable"
        );
        assert_eq!(
            error_message("", StatusCode::SERVICE_UNAVAILABLE),
            "Service Unavailable"
        );
    }

    #[test]
    fn test_parse_success_body() {
        assert_eq!(parse_success_body("").unwrap(), PublishResponse::default());
        assert_eq!(
            parse_success_body(r#"{"externalPostId":"fb_1"}"#)
                .unwrap()
                .external_post_id
                .as_deref(),
            Some("fb_1")
        );
        assert!(matches!(
            parse_success_body("<html>ok</html>"),
            Err(SchedcastError::Dispatch(DispatchError::InvalidResponse(_)))
        ));
    }
}
