//! Region rule table and first-match classification.
//!
//! `REGION_RULES` is an ordered sequence. When keyword sets overlap the
//! earlier rule wins, so moving a row changes classification.

use crate::normalize::normalize_name;
use regex::Regex;
use std::sync::LazyLock;

/// Matches `$w` as a whole ASCII word inside a normalized name.
macro_rules! word {
    ($w:literal) => {
        concat!(r"(?:^|[^a-z0-9])(?:", $w, r")(?:$|[^a-z0-9])")
    };
}

#[derive(Debug, PartialEq, Eq)]
pub struct RegionRule {
    /// Short region code, e.g. `hk`.
    pub code: &'static str,
    pub display_name: &'static str,
    pub emoji: &'static str,
    /// Patterns tried against the normalized name. Any match selects the rule.
    pub patterns: &'static [&'static str],
}

impl RegionRule {
    /// Name of the select group that collects this region's proxies.
    pub fn group_name(&self) -> String {
        format!("{} {}节点", self.emoji, self.display_name)
    }

    pub fn is_unknown(&self) -> bool {
        std::ptr::eq(self, &UNKNOWN_REGION)
    }
}

#[rustfmt::skip]
pub static REGION_RULES: &[RegionRule] = &[
    RegionRule { code: "hk", display_name: "香港", emoji: "🇭🇰", patterns: &[word!("hk"), "香港", r"hong\s*kong"] },
    RegionRule { code: "mo", display_name: "澳门", emoji: "🇲🇴", patterns: &[word!("mo"), "澳門|澳门", "macao|macau"] },
    RegionRule { code: "jp", display_name: "日本", emoji: "🇯🇵", patterns: &[word!("jp"), "日本|japan", "tokyo|osaka|nagoya"] },
    RegionRule { code: "tw", display_name: "台湾", emoji: "🇹🇼", patterns: &[word!("tw"), "台灣|台湾|taiwan", "taipei|taichung|kaohsiung"] },
    RegionRule { code: "sg", display_name: "新加坡", emoji: "🇸🇬", patterns: &[word!("sg"), "新加坡|singapore"] },
    RegionRule { code: "us", display_name: "美国", emoji: "🇺🇸", patterns: &[word!("us|usa"), r"美国|united\s*states|america", r"los\s*angeles|san\s*francisco|new\s*york|seattle|chicago|dallas|miami"] },
    RegionRule { code: "gb", display_name: "英国", emoji: "🇬🇧", patterns: &[word!("uk"), r"英国|united\s*kingdom|london"] },
    RegionRule { code: "de", display_name: "德国", emoji: "🇩🇪", patterns: &[word!("de"), "德国|germany|frankfurt|munich|berlin"] },
    RegionRule { code: "fr", display_name: "法国", emoji: "🇫🇷", patterns: &[word!("fr"), "法国|france|paris"] },
    RegionRule { code: "nl", display_name: "荷兰", emoji: "🇳🇱", patterns: &[word!("nl"), "荷兰|netherlands|amsterdam"] },
    RegionRule { code: "kr", display_name: "韩国", emoji: "🇰🇷", patterns: &[word!("kr"), "韩国|korea|seoul"] },
    RegionRule { code: "au", display_name: "澳大利亚", emoji: "🇦🇺", patterns: &[word!("au"), "澳大利亚|australia|sydney|melbourne"] },
    RegionRule { code: "ca", display_name: "加拿大", emoji: "🇨🇦", patterns: &[word!("ca"), "加拿大|canada|toronto|vancouver|montreal"] },
];

/// Default bucket. Has no patterns and is never matched directly.
pub static UNKNOWN_REGION: RegionRule = RegionRule {
    code: "unknown",
    display_name: "未知",
    emoji: "🏳️",
    patterns: &[],
};

// Compiled patterns, indexed like REGION_RULES.
static COMPILED: LazyLock<Vec<Vec<Regex>>> = LazyLock::new(|| {
    REGION_RULES
        .iter()
        .map(|rule| {
            rule.patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).expect("region pattern"))
                .collect()
        })
        .collect()
});

/// Index into `REGION_RULES` of the first rule matching `normalized`, or
/// `None` for the unknown region.
pub fn classify_index(normalized: &str) -> Option<usize> {
    COMPILED
        .iter()
        .position(|patterns| patterns.iter().any(|re| re.is_match(normalized)))
}

/// Classifies an already normalized name. Total: unmatched names land in
/// `UNKNOWN_REGION`.
pub fn classify(normalized: &str) -> &'static RegionRule {
    classify_index(normalized)
        .map(|i| &REGION_RULES[i])
        .unwrap_or(&UNKNOWN_REGION)
}

/// Normalizes then classifies a raw display name.
pub fn classify_name(raw: &str) -> &'static RegionRule {
    classify(&normalize_name(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(COMPILED.len(), REGION_RULES.len());
        for (rule, compiled) in REGION_RULES.iter().zip(COMPILED.iter()) {
            assert_eq!(rule.patterns.len(), compiled.len(), "{}", rule.code);
        }
    }

    #[test]
    fn test_scripts_and_casing() {
        for name in ["HK", "香港01", "Hong Kong #3", "🇭🇰 HongKong-IPLC", "hk.02"] {
            assert_eq!(classify_name(name).code, "hk", "{name}");
        }
        for name in ["US-01", "USA 2", "美国 洛杉矶", "Los Angeles", "United States 1x"] {
            assert_eq!(classify_name(name).code, "us", "{name}");
        }
        assert_eq!(classify_name("台灣 Taipei").code, "tw");
        assert_eq!(classify_name("UK London").code, "gb");
        assert_eq!(classify_name("澳門 01").code, "mo");
    }

    #[test]
    fn test_codes_need_word_boundaries() {
        // "hk" inside a longer token is not a region code
        assert!(classify_name("thkx").is_unknown());
        assert!(classify_name("Demo server").is_unknown());
        assert_eq!(classify_name("香港hk").code, "hk");
    }

    #[test]
    fn test_first_rule_wins() {
        // Mentions both Hong Kong and Japan; hk comes first in the table.
        assert_eq!(classify_name("香港 → 日本 中转").code, "hk");
        assert_eq!(classify_name("日本 via 香港").code, "hk");
    }

    #[test]
    fn test_total_and_stable() {
        for name in ["", "???", "Traffic: 100GB", "官网 example.com", "HK"] {
            let first = classify_name(name);
            for _ in 0..3 {
                assert!(std::ptr::eq(first, classify_name(name)));
            }
        }
        assert!(classify_name("Traffic: 100GB").is_unknown());
    }

    #[test]
    fn test_group_names() {
        assert_eq!(REGION_RULES[0].group_name(), "🇭🇰 香港节点");
        assert_eq!(UNKNOWN_REGION.group_name(), "🏳️ 未知节点");
        assert!(UNKNOWN_REGION.is_unknown());
        assert!(!REGION_RULES[0].is_unknown());
    }
}
