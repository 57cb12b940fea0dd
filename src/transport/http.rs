//! HTTP implementation of [`SyncApi`] over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{SyncApi, SyncError};
use crate::model::{Ack, EmailRequest, ErrorBody, ErrorCode, LastSyncResponse, RawRestorePayload, SyncRequest, SyncResponse};

/// Transport talking to a tasksync server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url` with an explicit per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SyncError::LocalState(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(classify_transport_error);
        }
        let retry_after_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, retry_after_header))
    }
}

/// Classify a `reqwest` failure that produced no HTTP status.
pub fn classify_transport_error(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Timeout
    } else if error.is_decode() {
        SyncError::Protocol(error.to_string())
    } else if let Some(status) = error.status() {
        classify_status(status, "", None)
    } else {
        SyncError::Network(error.to_string())
    }
}

/// Classify a non-success HTTP response.
pub fn classify_status(status: StatusCode, body: &str, retry_after_header: Option<u64>) -> SyncError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .map(|body| body.error.clone())
        .unwrap_or_else(|| format!("HTTP {status}"));

    if let Some(body) = &parsed {
        match body.code {
            ErrorCode::ValidationError => return SyncError::Validation(message),
            ErrorCode::NotFound => return SyncError::NotFound,
            ErrorCode::TokenExpired => return SyncError::TokenExpired,
            ErrorCode::RateLimited => {
                return SyncError::RateLimited {
                    retry_after_secs: body.retry_after.or(retry_after_header).unwrap_or(1),
                }
            }
            ErrorCode::DatabaseError | ErrorCode::MailError => return SyncError::Server(message),
        }
    }

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::PAYLOAD_TOO_LARGE => {
            SyncError::Validation(message)
        }
        StatusCode::NOT_FOUND => SyncError::NotFound,
        StatusCode::GONE => SyncError::TokenExpired,
        StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimited {
            retry_after_secs: retry_after_header.unwrap_or(1),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SyncError::Timeout,
        s if s.is_server_error() => SyncError::Server(message),
        _ => SyncError::Protocol(message),
    }
}

#[async_trait]
impl SyncApi for HttpTransport {
    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        debug!(
            "POST /sync ({} todos, {} priorities, cursor {:?})",
            request.todos.len(),
            request.priorities.len(),
            request.last_sync_at
        );
        let response = self
            .client
            .post(self.url("/sync"))
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;
        Self::decode(response).await
    }

    async fn last_sync(&self, token: &str) -> Result<Option<i64>, SyncError> {
        let response = self
            .client
            .get(self.url(&format!("/sync/{token}")))
            .send()
            .await
            .map_err(classify_transport_error)?;
        let body: LastSyncResponse = Self::decode(response).await?;
        Ok(body.last_sync_at)
    }

    async fn restore(&self, token: &str) -> Result<RawRestorePayload, SyncError> {
        debug!("GET /restore/{token}");
        let response = self
            .client
            .get(self.url(&format!("/restore/{token}")))
            .send()
            .await
            .map_err(classify_transport_error)?;
        Self::decode(response).await
    }

    async fn send_recovery_email(&self, email: &str, token: &str) -> Result<(), SyncError> {
        let request = EmailRequest {
            email: email.to_string(),
            token: token.to_string(),
        };
        let response = self
            .client
            .post(self.url("/email"))
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let ack: Ack = Self::decode(response).await?;
        if ack.success {
            Ok(())
        } else {
            Err(SyncError::Rejected)
        }
    }

    async fn health(&self) -> Result<(), SyncError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(classify_transport_error)?;
        let _: serde_json::Value = Self::decode(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_body_codes() {
        let body = r#"{"error":"slow down","code":"RATE_LIMITED","retryAfter":42}"#;
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, body, None),
            SyncError::RateLimited { retry_after_secs: 42 }
        );

        let body = r#"{"error":"token expired","code":"TOKEN_EXPIRED"}"#;
        assert_eq!(classify_status(StatusCode::GONE, body, None), SyncError::TokenExpired);
    }

    #[test]
    fn test_classify_bare_statuses() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "", Some(7)),
            SyncError::RateLimited { retry_after_secs: 7 }
        );
        assert!(classify_status(StatusCode::BAD_GATEWAY, "", None).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "oops", None).is_retryable());
        assert_eq!(classify_status(StatusCode::NOT_FOUND, "", None), SyncError::NotFound);
    }
}
