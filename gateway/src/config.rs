use converter::GeoxUrls;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener host cannot be empty")]
    EmptyHost,

    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),

    #[error("geox url for {0} cannot be empty")]
    EmptyGeoxUrl(&'static str),
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for client subscription requests
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Store-level expiry of cached upstream content
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Bound on one upstream fetch, body included
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// Geo database locations written into generated configs. The `geosite`
    /// entry is also where geo domains are extracted from.
    #[serde(default)]
    pub geox: GeoxUrls,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.cache_ttl_secs == 0 {
            return Err(ValidationError::ZeroDuration("cache_ttl_secs"));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("upstream_timeout_secs"));
        }

        let geox = [
            ("geoip", &self.geox.geoip),
            ("geosite", &self.geox.geosite),
            ("mmdb", &self.geox.mmdb),
            ("asn", &self.geox.asn),
        ];
        for (name, url) in geox {
            if url.trim().is_empty() {
                return Err(ValidationError::EmptyGeoxUrl(name));
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        Ok(())
    }
}
