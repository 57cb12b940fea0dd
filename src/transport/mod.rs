//! Transport abstraction between the sync client and the server.
//!
//! This module defines the [`SyncApi`] trait the sync client talks to and the
//! [`SyncError`] taxonomy every transport failure is classified into. The
//! classification happens exactly once, inside the transport; everything
//! above it branches on [`SyncError::kind`] and [`SyncError::is_retryable`].

use std::time::Duration;

use async_trait::async_trait;

use crate::model::{RawRestorePayload, SyncRequest, SyncResponse};

pub mod http;

pub use http::HttpTransport;

/// Classified sync failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unknown token")]
    NotFound,

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Sync was not accepted by the server")]
    Rejected,

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Local storage is full: {0}")]
    StorageQuota(String),

    #[error("Local state error: {0}")]
    LocalState(String),
}

/// Coarse error category, for display and branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    TokenExpired,
    RateLimited,
    Timeout,
    Network,
    Server,
    Rejected,
    Protocol,
    StorageQuota,
    LocalState,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound => ErrorKind::NotFound,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Timeout => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Network,
            Self::Server(_) => ErrorKind::Server,
            Self::Rejected => ErrorKind::Rejected,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::StorageQuota(_) => ErrorKind::StorageQuota,
            Self::LocalState(_) => ErrorKind::LocalState,
        }
    }

    /// Whether an automatic retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::Network | ErrorKind::Server | ErrorKind::Rejected
        )
    }

    /// Minimum delay the server asked for before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }
}

/// Operations the sync client needs from the server.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Push a local snapshot for reconciliation (`POST /sync`).
    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError>;

    /// Server-side last sync time for a token (`GET /sync/:token`).
    async fn last_sync(&self, token: &str) -> Result<Option<i64>, SyncError>;

    /// Fetch the stored snapshot for a token (`GET /restore/:token`).
    async fn restore(&self, token: &str) -> Result<RawRestorePayload, SyncError>;

    /// Ask the server to email the recovery token (`POST /email`).
    async fn send_recovery_email(&self, email: &str, token: &str) -> Result<(), SyncError>;

    /// Liveness probe (`GET /health`).
    async fn health(&self) -> Result<(), SyncError>;
}
