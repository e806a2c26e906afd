/// Client families that need a differently shaped document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientVariant {
    /// Full feature set: split DNS policy and remote icons.
    #[default]
    Mihomo,
    /// Conservative: no pattern based DNS policy, no icons.
    Stash,
    /// Full feature set plus a `tun` section.
    ClashXMeta,
}

const SUPPORTED_PREFIXES: &[&str] = &["stash/", "clash-verge/", "clashx", "clashmetaforandroid/"];

impl ClientVariant {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.starts_with("stash/") {
            ClientVariant::Stash
        } else if ua.starts_with("clashx meta/") {
            ClientVariant::ClashXMeta
        } else {
            ClientVariant::Mihomo
        }
    }

    pub fn is_conservative(self) -> bool {
        self == ClientVariant::Stash
    }

    pub fn wants_tun(self) -> bool {
        self == ClientVariant::ClashXMeta
    }
}

/// Whether a request from `user_agent` may be served. Requests without a
/// client identifier are let through.
pub fn is_supported_client(user_agent: Option<&str>) -> bool {
    match user_agent {
        None => true,
        Some(ua) => {
            let ua = ua.to_ascii_lowercase();
            SUPPORTED_PREFIXES.iter().any(|p| ua.starts_with(p))
        }
    }
}
