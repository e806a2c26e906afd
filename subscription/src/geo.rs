//! Domain lists extracted from the binary geosite dataset.
//!
//! Only plain, domain and full matchers are returned. Regex matchers cannot
//! be expressed in a fake-ip filter and are dropped.

use crate::errors::GeoError;
use crate::metrics_defs::GEOSITE_DOWNLOADS;
use async_trait::async_trait;
use moka::sync::Cache;
use prost::Message;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

const CACHE_SIZE: u64 = 16;
const CACHE_TTL: Duration = Duration::from_secs(6 * 3600);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, PartialEq, Message)]
pub struct GeoSiteList {
    #[prost(message, repeated, tag = "1")]
    pub entry: Vec<GeoSite>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GeoSite {
    #[prost(string, tag = "1")]
    pub country_code: String,
    #[prost(message, repeated, tag = "2")]
    pub domain: Vec<Domain>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Domain {
    #[prost(enumeration = "DomainType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DomainType {
    Plain = 0,
    Regex = 1,
    Domain = 2,
    Full = 3,
}

/// Decodes a geosite list and returns the usable domains of the entries
/// whose country code is in `country_codes` (case-insensitive).
pub fn extract_domains(data: &[u8], country_codes: &[&str]) -> Result<Vec<String>, GeoError> {
    let list = GeoSiteList::decode(data)?;

    let domains: Vec<String> = list
        .entry
        .into_iter()
        .filter(|site| {
            country_codes
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&site.country_code))
        })
        .flat_map(|site| site.domain)
        .filter(|domain| {
            matches!(
                DomainType::try_from(domain.r#type),
                Ok(DomainType::Plain | DomainType::Domain | DomainType::Full)
            )
        })
        .map(|domain| domain.value)
        .filter(|value| !value.is_empty())
        .collect();

    Ok(domains)
}

#[async_trait]
pub trait GeoDomainSource: Send + Sync {
    async fn domains(&self, country_codes: &[&str]) -> Result<Arc<Vec<String>>, GeoError>;
}

/// Downloads the geosite dataset from a URL and memoises extracted lists.
pub struct GeositeSource {
    client: reqwest::Client,
    url: String,
    cache: Cache<String, Arc<Vec<String>>>,
}

impl GeositeSource {
    pub fn new(url: impl Into<String>) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_SIZE)
            .time_to_live(CACHE_TTL)
            .build();

        GeositeSource {
            client: reqwest::Client::new(),
            url: url.into(),
            cache,
        }
    }

    async fn download(&self) -> Result<Vec<u8>, GeoError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GeoError::Status(response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl GeoDomainSource for GeositeSource {
    async fn domains(&self, country_codes: &[&str]) -> Result<Arc<Vec<String>>, GeoError> {
        let key = country_codes.join(",");
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        counter!(GEOSITE_DOWNLOADS).increment(1);
        let data = self.download().await?;
        let domains = Arc::new(extract_domains(&data, country_codes)?);
        tracing::info!(
            url = %self.url,
            countries = %key,
            count = domains.len(),
            "extracted geo domains"
        );

        self.cache.insert(key, domains.clone());
        Ok(domains)
    }
}
