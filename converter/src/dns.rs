//! General client settings and the DNS section.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

const CHINA_DOH: &[&str] = &["https://223.5.5.5/dns-query", "https://doh.pub/dns-query"];
const CHINA_DNS: &[&str] = &["223.5.5.5", "119.29.29.29"];
const FOREIGN_DOH: &[&str] = &[
    "https://cloudflare-dns.com/dns-query",
    "https://77.88.8.8/dns-query",
    "https://8.8.4.4/dns-query#ecs=1.1.1.1/24&ecs-override=true",
    "https://208.67.222.222/dns-query#ecs=1.1.1.1/24&ecs-override=true",
    "https://9.9.9.9/dns-query",
];

/// Download locations for the geo databases the client auto-updates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoxUrls {
    pub geoip: String,
    pub geosite: String,
    pub mmdb: String,
    pub asn: String,
}

impl Default for GeoxUrls {
    fn default() -> Self {
        const BASE: &str = "https://github.com/MetaCubeX/meta-rules-dat/releases/download/latest";
        GeoxUrls {
            geoip: format!("{BASE}/geoip.dat"),
            geosite: format!("{BASE}/geosite.dat"),
            mmdb: format!("{BASE}/country.mmdb"),
            asn: format!("{BASE}/GeoLite2-ASN.mmdb"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Profile {
    store_selected: bool,
    store_fake_ip: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct GeneralConfig<'a> {
    allow_lan: bool,
    bind_address: &'static str,
    mode: &'static str,
    profile: Profile,
    unified_delay: bool,
    tcp_concurrent: bool,
    geodata_loader: &'static str,
    geo_auto_update: bool,
    geo_update_interval: u32,
    geox_url: &'a GeoxUrls,
    geodata_mode: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PolicyTarget {
    Single(&'static str),
    Servers(&'static [&'static str]),
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct DnsConfig {
    enable: bool,
    listen: &'static str,
    ipv6: bool,
    enhanced_mode: &'static str,
    fake_ip_range: &'static str,
    fake_ip_filter: Vec<String>,
    default_nameserver: &'static [&'static str],
    nameserver: &'static [&'static str],
}

/// Keys the conservative client rejects.
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ExtendedDns {
    prefer_h3: bool,
    use_hosts: bool,
    use_system_hosts: bool,
    proxy_server_nameserver: &'static [&'static str],
    respect_rules: bool,
    direct_nameserver: &'static [&'static str],
    direct_nameserver_follow_policy: bool,
    nameserver_policy: IndexMap<&'static str, PolicyTarget>,
}

fn to_mapping<T: Serialize>(value: &T) -> Result<Mapping, serde_yaml::Error> {
    match serde_yaml::to_value(value)? {
        Value::Mapping(mapping) => Ok(mapping),
        other => Err(serde::ser::Error::custom(format!(
            "expected a mapping section, got {other:?}"
        ))),
    }
}

/// Client-wide settings merged into the document.
pub fn general_section(geox: &GeoxUrls) -> Result<Mapping, serde_yaml::Error> {
    to_mapping(&GeneralConfig {
        allow_lan: true,
        bind_address: "*",
        mode: "rule",
        profile: Profile {
            store_selected: true,
            store_fake_ip: true,
        },
        unified_delay: true,
        tcp_concurrent: true,
        geodata_loader: "standard",
        geo_auto_update: true,
        geo_update_interval: 24,
        geox_url: geox,
        geodata_mode: true,
    })
}

/// The value of the `dns` key.
///
/// `extra_fake_ip_filters` are appended after the built-in filters.
pub fn dns_section(
    conservative: bool,
    extra_fake_ip_filters: &[String],
) -> Result<Mapping, serde_yaml::Error> {
    let mut fake_ip_filter: Vec<String> = vec!["*".into(), "+.lan".into(), "+.local".into()];
    if !conservative {
        fake_ip_filter.push("geosite:connectivity-check".into());
        fake_ip_filter.push("geosite:private".into());
    }
    fake_ip_filter.push("localhost.work.weixin.qq.com".into());
    fake_ip_filter.extend(extra_fake_ip_filters.iter().cloned());

    let extended = (!conservative).then(|| ExtendedDns {
        prefer_h3: true,
        use_hosts: true,
        use_system_hosts: true,
        proxy_server_nameserver: CHINA_DOH,
        respect_rules: true,
        direct_nameserver: CHINA_DNS,
        direct_nameserver_follow_policy: false,
        nameserver_policy: IndexMap::from([
            ("geosite:private", PolicyTarget::Single("system")),
            (
                "geosite:cn,steam@cn,category-games@cn,microsoft@cn,apple@cn",
                PolicyTarget::Servers(CHINA_DNS),
            ),
        ]),
    });

    let mut section = to_mapping(&DnsConfig {
        enable: true,
        listen: ":1053",
        ipv6: true,
        enhanced_mode: "fake-ip",
        fake_ip_range: "198.18.0.1/16",
        fake_ip_filter,
        default_nameserver: &["tls://223.5.5.5"],
        nameserver: if conservative { CHINA_DOH } else { FOREIGN_DOH },
    })?;

    if let Some(extended) = extended {
        section.extend(to_mapping(&extended)?);
    }

    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(value: &Value) -> Vec<&str> {
        value
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_general_section() {
        let geox = GeoxUrls::default();
        let general = general_section(&geox).unwrap();
        assert_eq!(general["allow-lan"], Value::from(true));
        assert_eq!(general["bind-address"], Value::from("*"));
        assert_eq!(general["mode"], Value::from("rule"));
        assert_eq!(general["profile"]["store-fake-ip"], Value::from(true));
        assert_eq!(general["geo-update-interval"], Value::from(24));
        assert_eq!(general["geox-url"]["mmdb"], Value::from(geox.mmdb.as_str()));
    }

    #[test]
    fn test_dns_full_variant() {
        let dns = dns_section(false, &["+.corp.example".to_string()]).unwrap();
        assert_eq!(dns["enhanced-mode"], Value::from("fake-ip"));
        assert_eq!(strings(&dns["nameserver"]), FOREIGN_DOH);
        assert_eq!(
            strings(&dns["fake-ip-filter"]),
            [
                "*",
                "+.lan",
                "+.local",
                "geosite:connectivity-check",
                "geosite:private",
                "localhost.work.weixin.qq.com",
                "+.corp.example",
            ]
        );
        assert_eq!(dns["respect-rules"], Value::from(true));
        assert_eq!(strings(&dns["direct-nameserver"]), CHINA_DNS);
        assert_eq!(dns["nameserver-policy"]["geosite:private"], Value::from("system"));
        assert_eq!(
            strings(&dns["nameserver-policy"]["geosite:cn,steam@cn,category-games@cn,microsoft@cn,apple@cn"]),
            CHINA_DNS
        );
    }

    #[test]
    fn test_dns_conservative_variant() {
        let dns = dns_section(true, &[]).unwrap();
        assert_eq!(strings(&dns["nameserver"]), CHINA_DOH);
        assert_eq!(
            strings(&dns["fake-ip-filter"]),
            ["*", "+.lan", "+.local", "localhost.work.weixin.qq.com"]
        );
        for key in ["prefer-h3", "respect-rules", "nameserver-policy", "direct-nameserver"] {
            assert!(dns.get(key).is_none(), "{key}");
        }
    }

    #[test]
    fn test_non_mapping_section_is_an_error() {
        assert!(to_mapping(&42).is_err());
        assert!(to_mapping(&vec!["a"]).is_err());
        assert_eq!(to_mapping(&GeoxUrls::default()).unwrap().len(), 4);
    }

    #[test]
    fn test_geox_urls_from_yaml() {
        let geox: GeoxUrls = serde_yaml::from_str(
            "geoip: https://a/geoip.dat\ngeosite: https://a/geosite.dat\nmmdb: https://a/c.mmdb\nasn: https://a/asn.mmdb",
        )
        .unwrap();
        assert_eq!(geox.asn, "https://a/asn.mmdb");
        assert!(serde_yaml::from_str::<GeoxUrls>("geoip: x\nbogus: y").is_err());
    }
}
