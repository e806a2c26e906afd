use converter::ConvertError;
use http::StatusCode;
use std::time::Duration;
use store::StoreError;
use thiserror::Error;

/// Failure to obtain a usable document from the subscription URL.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Status(StatusCode),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("content is not yaml")]
    NotYaml,
}

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("geosite download failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("geosite download failed: {0}")]
    Status(StatusCode),

    #[error("geosite data is malformed: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Everything that can go wrong serving a subscription.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Subscription not found for token")]
    TokenNotFound,

    #[error("Failed to parse subscription data: {0}")]
    RecordParse(#[source] serde_json::Error),

    #[error("Upstream error: {0}")]
    UpstreamFetch(#[from] UpstreamError),

    #[error("{0}")]
    Conversion(#[from] ConvertError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Geo(#[from] GeoError),
}

impl SubscriptionError {
    /// The request itself is at fault: unknown token or an unusable record.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            SubscriptionError::TokenNotFound | SubscriptionError::RecordParse(_)
        )
    }

    pub fn is_upstream_fault(&self) -> bool {
        matches!(self, SubscriptionError::UpstreamFetch(_))
    }
}
