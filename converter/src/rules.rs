//! Rule providers and the ordered rule list routing traffic to policy groups.

use crate::topology::{
    AI_SERVICES, APPLE_SERVICES, BYBIT, CATCH_ALL_GROUP, DIRECT_GROUP, DOMESTIC_SITES,
    GOOGLE_AI_SERVICES, GOOGLE_SERVICES, MICROSOFT_SERVICES, MODE_SELECTOR, PIKPAK, TELEGRAM,
};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::fmt;

const PROVIDER_INTERVAL_SECS: u32 = 86400;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Domain,
    Ipcidr,
    Classical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Loyalsoldier,
    MetaCubeX,
}

/// A remotely hosted rule set referenced by `RULE-SET` rules.
#[derive(Clone, Copy, Debug)]
pub struct RuleProvider {
    pub name: &'static str,
    pub behavior: Behavior,
    source: Source,
}

#[derive(Serialize)]
struct ProviderEntry {
    #[serde(rename = "type")]
    kind: &'static str,
    behavior: Behavior,
    url: String,
    path: String,
    interval: u32,
    format: &'static str,
}

impl RuleProvider {
    const fn loyalsoldier(name: &'static str, behavior: Behavior) -> Self {
        RuleProvider { name, behavior, source: Source::Loyalsoldier }
    }

    const fn meta(name: &'static str) -> Self {
        RuleProvider { name, behavior: Behavior::Classical, source: Source::MetaCubeX }
    }

    pub fn url(&self) -> String {
        match self.source {
            Source::Loyalsoldier => format!(
                "https://fastly.jsdelivr.net/gh/Loyalsoldier/clash-rules@release/{}.txt",
                self.name
            ),
            Source::MetaCubeX => format!(
                "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/refs/heads/meta/geo/geosite/classical/{}.yaml",
                self.name
            ),
        }
    }

    pub fn path(&self) -> String {
        match self.source {
            Source::Loyalsoldier => format!("./ruleset/loyalsoldier/{}.yaml", self.name),
            Source::MetaCubeX => format!("./ruleset/MetaCubeX/{}.yaml", self.name),
        }
    }

    fn entry(&self) -> ProviderEntry {
        ProviderEntry {
            kind: "http",
            behavior: self.behavior,
            url: self.url(),
            path: self.path(),
            interval: PROVIDER_INTERVAL_SECS,
            format: "yaml",
        }
    }
}

#[rustfmt::skip]
pub const RULE_PROVIDERS: &[RuleProvider] = &[
    RuleProvider::loyalsoldier("reject", Behavior::Domain),
    RuleProvider::loyalsoldier("icloud", Behavior::Domain),
    RuleProvider::loyalsoldier("apple", Behavior::Domain),
    RuleProvider::loyalsoldier("google", Behavior::Domain),
    RuleProvider::loyalsoldier("proxy", Behavior::Domain),
    RuleProvider::loyalsoldier("direct", Behavior::Domain),
    RuleProvider::loyalsoldier("gfw", Behavior::Domain),
    RuleProvider::loyalsoldier("tld-not-cn", Behavior::Domain),
    RuleProvider::loyalsoldier("telegramcidr", Behavior::Ipcidr),
    RuleProvider::loyalsoldier("cncidr", Behavior::Ipcidr),
    RuleProvider::loyalsoldier("lancidr", Behavior::Ipcidr),
    RuleProvider::loyalsoldier("applications", Behavior::Classical),
    RuleProvider::meta("openai"),
    RuleProvider::meta("bybit"),
    RuleProvider::meta("pikpak"),
    RuleProvider::meta("anthropic"),
    RuleProvider::meta("google-gemini"),
    RuleProvider::meta("xai"),
    RuleProvider::meta("perplexity"),
    RuleProvider::meta("microsoft"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Matcher {
    DomainSuffix,
    RuleSet,
    GeoSite,
    GeoIp,
    Match,
}

impl Matcher {
    fn keyword(self) -> &'static str {
        match self {
            Matcher::DomainSuffix => "DOMAIN-SUFFIX",
            Matcher::RuleSet => "RULE-SET",
            Matcher::GeoSite => "GEOSITE",
            Matcher::GeoIp => "GEOIP",
            Matcher::Match => "MATCH",
        }
    }
}

/// One line of the `rules` section: `MATCHER,payload,target[,no-resolve]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rule {
    pub matcher: Matcher,
    pub payload: &'static str,
    pub target: &'static str,
    pub no_resolve: bool,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.matcher.keyword())?;
        if self.matcher != Matcher::Match {
            write!(f, ",{}", self.payload)?;
        }
        write!(f, ",{}", self.target)?;
        if self.no_resolve {
            f.write_str(",no-resolve")?;
        }
        Ok(())
    }
}

const fn rule(matcher: Matcher, payload: &'static str, target: &'static str) -> Rule {
    Rule { matcher, payload, target, no_resolve: false }
}

const fn no_resolve(matcher: Matcher, payload: &'static str, target: &'static str) -> Rule {
    Rule { matcher, payload, target, no_resolve: true }
}

/// Rules placed ahead of the rule-set driven ones.
#[rustfmt::skip]
pub const CUSTOM_RULES: &[Rule] = &[
    rule(Matcher::DomainSuffix, "aihubmix.com", DOMESTIC_SITES),
];

#[rustfmt::skip]
const ROUTING_RULES: &[Rule] = &[
    rule(Matcher::RuleSet, "openai", AI_SERVICES),
    rule(Matcher::RuleSet, "pikpak", PIKPAK),
    rule(Matcher::RuleSet, "bybit", BYBIT),
    rule(Matcher::RuleSet, "anthropic", AI_SERVICES),
    rule(Matcher::RuleSet, "google-gemini", GOOGLE_AI_SERVICES),
    rule(Matcher::RuleSet, "xai", AI_SERVICES),
    rule(Matcher::RuleSet, "perplexity", AI_SERVICES),
    rule(Matcher::GeoSite, "microsoft@cn", DOMESTIC_SITES),
    rule(Matcher::GeoSite, "apple@cn", DOMESTIC_SITES),
    rule(Matcher::GeoSite, "category-games@cn", DOMESTIC_SITES),
    rule(Matcher::RuleSet, "applications", DIRECT_GROUP),
    rule(Matcher::RuleSet, "microsoft", MICROSOFT_SERVICES),
    rule(Matcher::RuleSet, "icloud", APPLE_SERVICES),
    rule(Matcher::RuleSet, "apple", APPLE_SERVICES),
    rule(Matcher::RuleSet, "google", GOOGLE_SERVICES),
    rule(Matcher::RuleSet, "proxy", MODE_SELECTOR),
    rule(Matcher::RuleSet, "gfw", MODE_SELECTOR),
    rule(Matcher::RuleSet, "direct", DOMESTIC_SITES),
    rule(Matcher::GeoSite, "private", DIRECT_GROUP),
    no_resolve(Matcher::RuleSet, "lancidr", DIRECT_GROUP),
    no_resolve(Matcher::RuleSet, "cncidr", DOMESTIC_SITES),
    no_resolve(Matcher::RuleSet, "telegramcidr", TELEGRAM),
    no_resolve(Matcher::GeoIp, "private", DIRECT_GROUP),
    no_resolve(Matcher::GeoIp, "LAN", DIRECT_GROUP),
    no_resolve(Matcher::GeoIp, "CN", DOMESTIC_SITES),
    rule(Matcher::Match, "", CATCH_ALL_GROUP),
];

/// Every rule in evaluation order. The catch-all is always last.
pub fn all_rules() -> impl Iterator<Item = &'static Rule> {
    CUSTOM_RULES.iter().chain(ROUTING_RULES)
}

/// The `rule-providers` and `rules` keys, ready to be placed in a document.
pub fn rules_section() -> Mapping {
    let mut providers = Mapping::new();
    for provider in RULE_PROVIDERS {
        let entry = serde_yaml::to_value(provider.entry()).unwrap_or(Value::Null);
        providers.insert(Value::from(provider.name), entry);
    }

    let rules: Vec<Value> = all_rules().map(|r| Value::from(r.to_string())).collect();

    let mut section = Mapping::new();
    section.insert(Value::from("rule-providers"), Value::Mapping(providers));
    section.insert(Value::from("rules"), Value::Sequence(rules));
    section
}
