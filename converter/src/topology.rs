//! Policy group topology derived from the classified proxy set.
//!
//! Output order: mode selector, node selector, purpose groups, region groups
//! (sorted by name, unknown last), mode groups, direct, reject, catch-all.

use crate::filter::proxy_name;
use crate::normalize::normalize_name;
use crate::region::{REGION_RULES, RegionRule, UNKNOWN_REGION, classify_index};
use serde::Serialize;
use serde_yaml::Value;

pub const MODE_SELECTOR: &str = "🔰 模式选择";
pub const NODE_SELECTOR: &str = "⚙️ 节点选择";
pub const DIRECT_GROUP: &str = "🔗 全局直连";
pub const REJECT_GROUP: &str = "❌ 全局拦截";
pub const CATCH_ALL_GROUP: &str = "🐟 漏网之鱼";

pub const URL_TEST_GROUP: &str = "♻️ 延迟选优";
pub const FALLBACK_GROUP: &str = "🚑 故障转移";
pub const HASH_BALANCE_GROUP: &str = "⚖️ 负载均衡(散列)";
pub const ROUND_ROBIN_GROUP: &str = "☁️ 负载均衡(轮询)";

pub const FOREIGN_MEDIA: &str = "🌍 国外媒体";
pub const AI_SERVICES: &str = "💸 AI Services";
pub const GOOGLE_AI_SERVICES: &str = "💸 Google AI Services";
pub const BYBIT: &str = "🪙 Bybit";
pub const PIKPAK: &str = "🅿️ PikPak";
pub const TELEGRAM: &str = "📲 电报消息";
pub const GOOGLE_SERVICES: &str = "📢 谷歌服务";
pub const APPLE_SERVICES: &str = "🍎 苹果服务";
pub const MICROSOFT_SERVICES: &str = "Ⓜ️ 微软服务";
pub const DOMESTIC_SITES: &str = "🇨🇳 国内网站";

/// Built-in outbounds every client understands.
pub const DIRECT: &str = "DIRECT";
pub const REJECT: &str = "REJECT";

const HEALTH_CHECK_URL: &str = "https://www.google.com/generate_204";
const ICON_BASE: &str =
    "https://fastly.jsdelivr.net/gh/clash-verge-rev/clash-verge-rev.github.io@main/docs/assets/icons";
const FLAG_BASE: &str = "https://cdn.jsdelivr.net/gh/lipis/flag-icons@7.3.2/flags/1x1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    Select,
    UrlTest,
    Fallback,
    LoadBalance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalanceStrategy {
    ConsistentHashing,
    RoundRobin,
}

/// Health check settings shared by every group.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GroupOptions {
    pub interval: u32,
    pub timeout: u32,
    pub url: &'static str,
    pub lazy: bool,
    pub max_failed_times: u32,
    pub hidden: bool,
}

impl Default for GroupOptions {
    fn default() -> Self {
        GroupOptions {
            interval: 0,
            timeout: 3000,
            url: HEALTH_CHECK_URL,
            lazy: true,
            max_failed_times: 3,
            hidden: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    /// Explicit members. `None` for groups spanning every proxy via `include-all`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<BalanceStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<u32>,
    #[serde(flatten)]
    pub options: GroupOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PolicyGroup {
    fn select(name: impl Into<String>, members: Vec<String>) -> Self {
        PolicyGroup {
            name: name.into(),
            kind: GroupKind::Select,
            proxies: Some(members),
            include_all: None,
            strategy: None,
            tolerance: None,
            options: GroupOptions::default(),
            icon: None,
        }
    }

    fn include_all(name: &str, kind: GroupKind) -> Self {
        PolicyGroup {
            name: name.to_string(),
            kind,
            proxies: None,
            include_all: Some(true),
            strategy: None,
            tolerance: None,
            options: GroupOptions::default(),
            icon: None,
        }
    }

    fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn members(&self) -> &[String] {
        self.proxies.as_deref().unwrap_or_default()
    }
}

/// Routing destinations offered to the user, with their icon file.
/// `DOMESTIC_SITES` is listed separately because it defaults to direct.
const PURPOSE_GROUPS: &[(&str, &str)] = &[
    (FOREIGN_MEDIA, "youtube.svg"),
    (AI_SERVICES, "chatgpt.svg"),
    (GOOGLE_AI_SERVICES, "google.svg"),
    (BYBIT, "link.svg"),
    (PIKPAK, "link.svg"),
    (TELEGRAM, "telegram.svg"),
    (GOOGLE_SERVICES, "google.svg"),
    (APPLE_SERVICES, "apple.svg"),
    (MICROSOFT_SERVICES, "microsoft.svg"),
];

pub const MODE_GROUPS: [&str; 4] = [
    URL_TEST_GROUP,
    FALLBACK_GROUP,
    HASH_BALANCE_GROUP,
    ROUND_ROBIN_GROUP,
];

fn icon(file: &str) -> String {
    format!("{ICON_BASE}/{file}")
}

fn region_icon(rule: &RegionRule) -> String {
    if rule.is_unknown() {
        icon("unknown.svg")
    } else {
        format!("{FLAG_BASE}/{}.svg", rule.code)
    }
}

fn mode_groups() -> Vec<PolicyGroup> {
    let mut url_test = PolicyGroup::include_all(URL_TEST_GROUP, GroupKind::UrlTest)
        .with_icon(icon("speed.svg"));
    url_test.tolerance = Some(50);

    let fallback = PolicyGroup::include_all(FALLBACK_GROUP, GroupKind::Fallback)
        .with_icon(icon("ambulance.svg"));

    let mut hashed = PolicyGroup::include_all(HASH_BALANCE_GROUP, GroupKind::LoadBalance)
        .with_icon(icon("merry_go.svg"));
    hashed.strategy = Some(BalanceStrategy::ConsistentHashing);

    let mut round_robin = PolicyGroup::include_all(ROUND_ROBIN_GROUP, GroupKind::LoadBalance)
        .with_icon(icon("balance.svg"));
    round_robin.strategy = Some(BalanceStrategy::RoundRobin);

    vec![url_test, fallback, hashed, round_robin]
}

/// One select group per non-empty region bucket, sorted by group name with
/// the unknown bucket forced last.
fn region_groups(proxies: &[Value]) -> Vec<PolicyGroup> {
    // Slot i holds REGION_RULES[i]; the extra last slot is the unknown region.
    let mut buckets: Vec<Vec<String>> = vec![Vec::new(); REGION_RULES.len() + 1];

    for proxy in proxies {
        let name = proxy_name(proxy);
        if name.is_empty() {
            tracing::warn!("skipping proxy without a name");
            continue;
        }
        let slot = classify_index(&normalize_name(name)).unwrap_or(REGION_RULES.len());
        buckets[slot].push(name.to_string());
    }

    let unknown_members = buckets.pop().unwrap_or_default();

    let mut groups: Vec<PolicyGroup> = REGION_RULES
        .iter()
        .zip(buckets)
        .filter(|(_, members)| !members.is_empty())
        .map(|(rule, members)| {
            PolicyGroup::select(rule.group_name(), members).with_icon(region_icon(rule))
        })
        .collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name));

    if !unknown_members.is_empty() {
        groups.push(
            PolicyGroup::select(UNKNOWN_REGION.group_name(), unknown_members)
                .with_icon(region_icon(&UNKNOWN_REGION)),
        );
    }

    groups
}

/// Builds every policy group for the given proxies.
///
/// `conservative` drops icon URLs, which the conservative client cannot load.
/// The result depends only on the inputs, never on hash iteration order.
pub fn build_proxy_groups(proxies: &[Value], conservative: bool) -> Vec<PolicyGroup> {
    let regions = region_groups(proxies);
    let region_names: Vec<String> = regions.iter().map(|g| g.name.clone()).collect();
    let mode_names = MODE_GROUPS.map(String::from);

    let routing_members = |direct_first: bool| -> Vec<String> {
        let mut members = Vec::with_capacity(7 + region_names.len());
        if direct_first {
            members.push(DIRECT_GROUP.to_string());
        }
        members.push(MODE_SELECTOR.to_string());
        members.push(NODE_SELECTOR.to_string());
        members.extend(mode_names.iter().cloned());
        if !direct_first {
            members.push(DIRECT_GROUP.to_string());
        }
        members.extend(region_names.iter().cloned());
        members
    };

    let mut groups = Vec::new();

    let mut selector_members = vec![NODE_SELECTOR.to_string()];
    selector_members.extend(mode_names.iter().cloned());
    selector_members.push(DIRECT_GROUP.to_string());
    groups.push(PolicyGroup::select(MODE_SELECTOR, selector_members));

    groups.push(PolicyGroup::select(NODE_SELECTOR, region_names.clone()).with_icon(icon("adjust.svg")));

    for (name, icon_file) in PURPOSE_GROUPS {
        groups.push(PolicyGroup::select(*name, routing_members(false)).with_icon(icon(icon_file)));
    }
    groups.push(
        PolicyGroup::select(DOMESTIC_SITES, routing_members(true))
            .with_icon("https://fastly.jsdelivr.net/gh/lipis/flag-icons@7.3.2/flags/1x1/cn.svg"),
    );

    groups.extend(regions);
    groups.extend(mode_groups());

    groups.push(PolicyGroup::select(DIRECT_GROUP, vec![DIRECT.to_string()]).with_icon(icon("link.svg")));
    groups.push(
        PolicyGroup::select(REJECT_GROUP, vec![REJECT.to_string(), DIRECT.to_string()])
            .with_icon(icon("block.svg")),
    );

    let mut catch_all = vec![MODE_SELECTOR.to_string(), NODE_SELECTOR.to_string()];
    catch_all.extend(mode_names.iter().cloned());
    catch_all.push(DIRECT_GROUP.to_string());
    groups.push(PolicyGroup::select(CATCH_ALL_GROUP, catch_all).with_icon(icon("fish.svg")));

    if conservative {
        for group in &mut groups {
            group.icon = None;
        }
    }

    groups
}
