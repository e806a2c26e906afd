//! Subscription metadata carried in upstream response headers.
//!
//! Every field is optional and parsed independently. A malformed value only
//! drops that one field.

use http::HeaderMap;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Forwarded verbatim to the client when present.
pub const PASSTHROUGH_HEADERS: [&str; 4] = [
    "Content-Disposition",
    "Profile-Update-Interval",
    "Subscription-Userinfo",
    "Profile-Web-Page-Url",
];

const MIB: u64 = 1024 * 1024;

static FILENAME_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)filename\*=([^;']+'')?([^;\n]*)").expect("filename* pattern")
});
static FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)filename=([^;\n]*)").expect("filename pattern"));
static UPLOAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"upload=(\d+)").expect("upload pattern"));
static DOWNLOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"download=(\d+)").expect("download pattern"));
static TOTAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"total=(\d+)").expect("total pattern"));
static EXPIRE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"expire=(\d+)").expect("expire pattern"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(rename = "totalMiB")]
    pub total_mib: u64,
    #[serde(rename = "usedMiB")]
    pub used_mib: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubHeaders {
    /// Non-empty passthrough headers, in `PASSTHROUGH_HEADERS` order.
    #[serde(default)]
    pub raw_headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_update_interval_hour: Option<u64>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

pub fn parse_sub_headers(headers: &HeaderMap) -> SubHeaders {
    let mut raw_headers = IndexMap::new();
    for name in PASSTHROUGH_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok())
            && !value.is_empty()
        {
            raw_headers.insert(name.to_string(), value.to_string());
        }
    }

    let mut result = SubHeaders {
        file_name: raw_headers.get("Content-Disposition").and_then(|v| parse_file_name(v)),
        profile_update_interval_hour: raw_headers
            .get("Profile-Update-Interval")
            .and_then(|v| parse_leading_int(v)),
        ..Default::default()
    };

    if let Some(userinfo) = raw_headers.get("Subscription-Userinfo") {
        result.usage = parse_usage(userinfo);
        result.expire_at = capture_u64(&EXPIRE, userinfo);
    }

    result.raw_headers = raw_headers;
    result
}

/// Prefers the RFC 5987 `filename*` form, falling back to `filename`.
pub fn parse_file_name(content_disposition: &str) -> Option<String> {
    if let Some(encoded) = FILENAME_EXT
        .captures(content_disposition)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
    {
        let decoded = percent_decode_str(encoded)
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| encoded.to_string());
        return Some(decoded);
    }

    let plain = FILENAME.captures(content_disposition)?.get(1)?.as_str();
    let plain = plain.strip_prefix(['"', '\'']).unwrap_or(plain);
    let plain = plain.strip_suffix(['"', '\'']).unwrap_or(plain).trim();
    (!plain.is_empty()).then(|| plain.to_string())
}

/// Leading decimal integer, ignoring leading whitespace and trailing junk.
fn parse_leading_int(value: &str) -> Option<u64> {
    let trimmed = value.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn capture_u64(re: &Regex, haystack: &str) -> Option<u64> {
    re.captures(haystack)?.get(1)?.as_str().parse().ok()
}

fn to_mib(bytes: u64) -> u64 {
    bytes.saturating_add(MIB / 2) / MIB
}

/// Usage is only reported when `total` is present.
fn parse_usage(userinfo: &str) -> Option<Usage> {
    let total = capture_u64(&TOTAL, userinfo)?;
    let upload = capture_u64(&UPLOAD, userinfo).unwrap_or(0);
    let download = capture_u64(&DOWNLOAD, userinfo).unwrap_or(0);
    Some(Usage {
        total_mib: to_mib(total),
        used_mib: to_mib(upload.saturating_add(download)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_file_name_forms() {
        assert_eq!(
            parse_file_name("attachment; filename=config.yaml").as_deref(),
            Some("config.yaml")
        );
        assert_eq!(
            parse_file_name("attachment; filename=\"quoted name.yaml\"").as_deref(),
            Some("quoted name.yaml")
        );
        assert_eq!(
            parse_file_name("attachment; filename*=UTF-8''config%20file.yaml").as_deref(),
            Some("config file.yaml")
        );
        // encoded form wins when both are present
        assert_eq!(
            parse_file_name("attachment; filename=plain.yaml; filename*=UTF-8''%E6%9C%BA%E5%9C%BA").as_deref(),
            Some("机场")
        );
        // undecodable percent sequences fall back to the raw value
        assert_eq!(
            parse_file_name("attachment; filename*=UTF-8''%FF%FE").as_deref(),
            Some("%FF%FE")
        );
        assert_eq!(parse_file_name("inline"), None);
    }

    #[test]
    fn test_full_header_set() {
        let parsed = parse_sub_headers(&headers(&[
            ("content-disposition", "attachment; filename=sub.yaml"),
            ("profile-update-interval", "24"),
            (
                "subscription-userinfo",
                "upload=1048576; download=2097152; total=10737418240; expire=1696377600",
            ),
            ("profile-web-page-url", "https://example.com"),
            ("x-unrelated", "dropped"),
        ]));

        assert_eq!(parsed.file_name.as_deref(), Some("sub.yaml"));
        assert_eq!(parsed.profile_update_interval_hour, Some(24));
        assert_eq!(parsed.expire_at, Some(1696377600));
        assert_eq!(
            parsed.usage,
            Some(Usage {
                total_mib: 10240,
                used_mib: 3
            })
        );
        let names: Vec<&str> = parsed.raw_headers.keys().map(String::as_str).collect();
        assert_eq!(names, PASSTHROUGH_HEADERS);
    }

    #[test]
    fn test_usage_requires_total() {
        let parsed = parse_sub_headers(&headers(&[(
            "subscription-userinfo",
            "upload=10; download=20; expire=1700000000",
        )]));
        assert_eq!(parsed.usage, None);
        assert_eq!(parsed.expire_at, Some(1700000000));
    }

    #[test]
    fn test_mib_rounding() {
        assert_eq!(to_mib(0), 0);
        assert_eq!(to_mib(MIB / 2 - 1), 0);
        assert_eq!(to_mib(MIB / 2), 1);
        assert_eq!(to_mib(3 * MIB), 3);
    }

    #[test]
    fn test_malformed_fields_are_dropped() {
        let parsed = parse_sub_headers(&headers(&[
            ("profile-update-interval", "soon"),
            ("subscription-userinfo", "total=lots"),
            ("content-disposition", ""),
        ]));
        assert_eq!(parsed.profile_update_interval_hour, None);
        assert_eq!(parsed.usage, None);
        assert_eq!(parsed.file_name, None);
        assert_eq!(parsed.raw_headers.len(), 2);
        assert_eq!(parse_leading_int(" 12h"), Some(12));
    }

    #[test]
    fn test_cache_json_shape() {
        let parsed = parse_sub_headers(&headers(&[("subscription-userinfo", "total=1048576")]));
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["usage"]["totalMiB"], 1);
        assert_eq!(json["rawHeaders"]["Subscription-Userinfo"], "total=1048576");
        let back: SubHeaders = serde_json::from_value(json).unwrap();
        assert_eq!(back, parsed);
    }
}
