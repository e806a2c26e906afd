//! User defined proxy filtering: region allow-list, billing-rate ceiling and
//! exclusion pattern. The three predicates are independent and combined with
//! AND semantics; relative order of the surviving proxies is preserved.

use crate::errors::ConvertError;
use crate::normalize::normalize_name;
use crate::region::classify;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::sync::LazyLock;

/// Filter stored alongside a subscription record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub label: String,
    /// Region codes to keep, compared case-insensitively. Empty keeps all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_billing_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_regex: Option<String>,
}

impl FilterCriteria {
    pub fn is_noop(&self) -> bool {
        self.regions.as_ref().is_none_or(|r| r.is_empty())
            && self.max_billing_rate.is_none()
            && self.exclude_regex.as_deref().is_none_or(str::is_empty)
    }
}

// A multiplier either follows a marker ("x2", "倍率1.5") or precedes one
// ("2x", "0.5倍"). The marker-after alternative is only tried when the
// marker-before one fails at the same position.
static MULTIPLIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:[x✕✖⨉倍率]([1-9]\d*(?:\.\d+)?|0\.\d+)|([1-9]\d*(?:\.\d+)?|0\.\d+)[x✕✖⨉倍率])",
    )
    .expect("multiplier pattern")
});

/// Billing multiplier embedded in a normalized name, `0.0` when absent.
pub fn billing_multiplier(normalized: &str) -> f64 {
    MULTIPLIER
        .captures(normalized)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Display name of a proxy entry, empty when the entry has none.
pub fn proxy_name(proxy: &Value) -> &str {
    proxy.get("name").and_then(Value::as_str).unwrap_or_default()
}

/// Returns the proxies passing every configured predicate.
///
/// Fails only when `exclude_regex` does not compile.
pub fn filter_proxies(proxies: &[Value], criteria: &FilterCriteria) -> Result<Vec<Value>, ConvertError> {
    let allowed_regions: Vec<String> = criteria
        .regions
        .iter()
        .flatten()
        .map(|r| r.to_lowercase())
        .collect();

    let exclude = match criteria.exclude_regex.as_deref() {
        Some(pattern) if !pattern.is_empty() => {
            Some(Regex::new(pattern).map_err(|source| ConvertError::FilterPattern {
                pattern: pattern.to_string(),
                source,
            })?)
        }
        _ => None,
    };

    let kept: Vec<Value> = proxies
        .iter()
        .filter(|proxy| {
            let normalized = normalize_name(proxy_name(proxy));

            if !allowed_regions.is_empty() {
                let code = classify(&normalized).code;
                if !allowed_regions.iter().any(|r| r == code) {
                    return false;
                }
            }

            if let Some(ceiling) = criteria.max_billing_rate
                && billing_multiplier(&normalized) > ceiling
            {
                return false;
            }

            if let Some(re) = &exclude
                && re.is_match(&normalized)
            {
                return false;
            }

            true
        })
        .cloned()
        .collect();

    tracing::debug!(
        filter = %criteria.label,
        before = proxies.len(),
        after = kept.len(),
        "filtered proxies"
    );

    Ok(kept)
}
