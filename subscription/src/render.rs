//! Turns cached or freshly fetched content into the document a client gets.

use crate::errors::SubscriptionError;
use crate::geo::GeoDomainSource;
use crate::metrics_defs::CONVERSION_DURATION;
use converter::{ClientVariant, ConvertOptions, FilterCriteria, GeoxUrls, convert_yaml};
use shared::histogram;
use std::sync::Arc;
use std::time::Instant;

/// Geosite categories excluded from fake-ip for the conservative client.
pub const FAKE_IP_GEO_CODES: &[&str] = &["private", "connectivity-check"];

pub struct Renderer {
    geo: Arc<dyn GeoDomainSource>,
    geox: GeoxUrls,
}

impl Renderer {
    pub fn new(geo: Arc<dyn GeoDomainSource>, geox: GeoxUrls) -> Self {
        Renderer { geo, geox }
    }

    pub async fn render(
        &self,
        content: &str,
        label: &str,
        user_agent: Option<&str>,
        filter: Option<&FilterCriteria>,
    ) -> Result<String, SubscriptionError> {
        let variant = ClientVariant::from_user_agent(user_agent.unwrap_or_default());

        // The conservative client lacks geosite matchers in its DNS filter,
        // so the categories are expanded to plain domains.
        let extra_fake_ip_filters = if variant.is_conservative() {
            self.geo.domains(FAKE_IP_GEO_CODES).await?.to_vec()
        } else {
            Vec::new()
        };

        let options = ConvertOptions {
            label: label.to_string(),
            variant,
            filter: filter.cloned(),
            geox: self.geox.clone(),
            extra_fake_ip_filters,
        };

        let started = Instant::now();
        let converted = convert_yaml(content, &options)?;
        let variant_tag = format!("{variant:?}").to_lowercase();
        histogram!(CONVERSION_DURATION, "variant" => variant_tag).record(started.elapsed().as_secs_f64());

        Ok(converted)
    }
}
