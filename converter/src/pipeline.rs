//! Applies every generated section to one parsed subscription document.

use crate::dns::{GeoxUrls, dns_section, general_section};
use crate::errors::ConvertError;
use crate::filter::{FilterCriteria, filter_proxies};
use crate::merge::{deep_merge, shallow_replace};
use crate::rules::rules_section;
use crate::topology::build_proxy_groups;
use crate::variant::ClientVariant;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

pub const MIXED_PORT: u16 = 7890;

const LEGACY_PORT_KEYS: &[&str] = &["port", "socks-port", "redir-port", "tproxy-port"];

#[derive(Clone, Debug, Default)]
pub struct ConvertOptions {
    /// Display label, used for logging.
    pub label: String,
    pub variant: ClientVariant,
    pub filter: Option<FilterCriteria>,
    pub geox: GeoxUrls,
    /// Appended to the DNS fake-ip filter.
    pub extra_fake_ip_filters: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Tun {
    enable: bool,
    device: &'static str,
    stack: &'static str,
    dns_hijack: &'static [&'static str],
    auto_route: bool,
    auto_detect_interface: bool,
}

const TUN: Tun = Tun {
    enable: true,
    device: "utun6",
    stack: "gVisor",
    dns_hijack: &["0.0.0.0:53"],
    auto_route: true,
    auto_detect_interface: true,
};

fn single(key: &str, value: Value) -> Mapping {
    let mut mapping = Mapping::new();
    mapping.insert(Value::from(key), value);
    mapping
}

/// Rewrites `document` in place into a complete client configuration.
///
/// Every fallible step runs before the first mutation, so on error the
/// document is left untouched.
pub fn convert_document(document: &mut Mapping, options: &ConvertOptions) -> Result<(), ConvertError> {
    let proxies = document
        .get("proxies")
        .and_then(Value::as_sequence)
        .ok_or(ConvertError::MissingProxies)?;

    let proxies = match &options.filter {
        Some(criteria) if !criteria.is_noop() => filter_proxies(proxies, criteria)?,
        _ => proxies.clone(),
    };

    let conservative = options.variant.is_conservative();
    let groups = serde_yaml::to_value(build_proxy_groups(&proxies, conservative))?;
    let general = general_section(&options.geox)?;
    let dns = dns_section(conservative, &options.extra_fake_ip_filters)?;
    let tun = if options.variant.wants_tun() {
        Some(serde_yaml::to_value(&TUN)?)
    } else {
        None
    };

    document.insert(Value::from("proxies"), Value::Sequence(proxies));

    deep_merge(document, &general);
    shallow_replace(document, single("dns", Value::Mapping(dns)));
    shallow_replace(document, rules_section());
    shallow_replace(document, single("proxy-groups", groups));

    for key in LEGACY_PORT_KEYS {
        document.shift_remove(*key);
    }
    document.insert(Value::from("mixed-port"), Value::from(MIXED_PORT));
    document.shift_remove("hosts");

    if let Some(tun) = tun {
        shallow_replace(document, single("tun", tun));
    }

    tracing::debug!(
        label = %options.label,
        variant = ?options.variant,
        "converted subscription"
    );

    Ok(())
}

/// Parses, converts and re-serializes a YAML subscription.
pub fn convert_yaml(source: &str, options: &ConvertOptions) -> Result<String, ConvertError> {
    let mut document = match serde_yaml::from_str::<Value>(source)? {
        Value::Mapping(mapping) => mapping,
        _ => return Err(ConvertError::MissingProxies),
    };
    convert_document(&mut document, options)?;
    Ok(serde_yaml::to_string(&document)?)
}
