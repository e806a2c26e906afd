//! Subscription records, upstream fetching, artifact caching and rendering.

pub mod cache;
pub mod errors;
pub mod geo;
pub mod headers;
pub mod metrics_defs;
pub mod record;
pub mod render;
pub mod upstream;

#[cfg(test)]
mod testutils;

pub use cache::{CachedArtifact, CachedSubscription, SubscriptionCache};
pub use errors::{GeoError, SubscriptionError, UpstreamError};
pub use geo::{GeoDomainSource, GeositeSource};
pub use headers::SubHeaders;
pub use record::{RecordStore, SubscriptionRecord};
pub use render::Renderer;
pub use upstream::{HttpFetcher, UpstreamFetcher, UpstreamResponse};
