/// Remote video catalog
///
/// The run only needs three remote operations: list the titles already in a
/// collection, upload a rendered video, and attach it to the collection.
/// Every call is expected to go through `clip_core::QuotaRetry`.

pub mod oauth;
pub mod youtube;

pub use oauth::{OAuthToken, TokenProvider};
pub use youtube::YoutubeCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clip_core::QuotaClassify;
use std::collections::HashSet;
use std::path::PathBuf;

/// Error reasons the API reports when a quota or rate limit is hit
const QUOTA_REASONS: [&str; 4] = [
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

/// Result type for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    Response(String),
}

impl QuotaClassify for CatalogError {
    fn is_quota_exceeded(&self) -> bool {
        let message = self.to_string();
        QUOTA_REASONS.iter().any(|reason| message.contains(reason))
    }
}

/// Video upload parameters
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub title: String,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

/// Remote collection of uploaded videos
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Titles of every item already in the collection
    async fn list_existing_titles(&self, collection_id: &str) -> CatalogResult<HashSet<String>>;

    /// Uploads a video and returns its remote id
    async fn upload(&self, request: &UploadRequest) -> CatalogResult<String>;

    /// Adds an uploaded video to the collection
    async fn attach_to_collection(&self, collection_id: &str, remote_id: &str) -> CatalogResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_classification() {
        let quota = CatalogError::Api {
            status: 403,
            body: r#"{"error": {"errors": [{"reason": "quotaExceeded"}]}}"#.to_string(),
        };
        let daily = CatalogError::Api {
            status: 403,
            body: "dailyLimitExceeded".to_string(),
        };
        let forbidden = CatalogError::Api {
            status: 403,
            body: r#"{"error": {"errors": [{"reason": "forbidden"}]}}"#.to_string(),
        };

        assert!(quota.is_quota_exceeded());
        assert!(daily.is_quota_exceeded());
        assert!(!forbidden.is_quota_exceeded());
        assert!(!CatalogError::Auth("token expired".to_string()).is_quota_exceeded());

        for reason in ["rateLimitExceeded", "userRateLimitExceeded"] {
            let limited = CatalogError::Api {
                status: 403,
                body: format!(r#"{{"error": {{"errors": [{{"reason": "{}"}}]}}}}"#, reason),
            };
            assert!(limited.is_quota_exceeded(), "{} should be retried", reason);
        }
    }
}
