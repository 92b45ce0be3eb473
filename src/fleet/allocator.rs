//! Browser fleet allocation
//!
//! Computes the browser-family assignment for a fleet so the configured mix
//! percentages are respected, then shuffles it so role and browser identity
//! are decorrelated. Proxy ports are assigned by fleet position, independent
//! of the shuffle.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::FleetConfig;

/// Supported browser families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BrowserFamily {
    Chromium,
    Webkit,
    Firefox,
}

impl BrowserFamily {
    /// User-agent string presented by contexts of this family.
    pub fn user_agent(&self) -> &'static str {
        match self {
            BrowserFamily::Chromium => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            }
            BrowserFamily::Webkit => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.0 Safari/605.1.15"
            }
            BrowserFamily::Firefox => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) \
                 Gecko/20100101 Firefox/121.0"
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserFamily::Chromium => "chromium",
            BrowserFamily::Webkit => "webkit",
            BrowserFamily::Firefox => "firefox",
        }
    }
}

impl std::fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentRole {
    Visitor,
    Administrator,
}

/// Immutable identity of one fleet member.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    /// Role-scoped id, e.g. "admin-1" or "visitor-7"
    pub id: String,
    pub role: AgentRole,
    pub family: BrowserFamily,
    /// Unique per descriptor when proxying is enabled; base + fleet index
    pub proxy_port: Option<u16>,
}

/// Assign browser families for `total` agents: floor(total * pct) for
/// chromium and webkit, remainder to firefox with a floor of one whenever
/// the fleet is non-empty, then a decorrelating shuffle.
pub fn allocate_families(
    total: usize,
    chrome_pct: f64,
    webkit_pct: f64,
    rng: &mut impl Rng,
) -> Vec<BrowserFamily> {
    if total == 0 {
        return Vec::new();
    }

    let num_chrome = (total as f64 * chrome_pct) as usize;
    let num_webkit = (total as f64 * webkit_pct) as usize;
    let num_firefox = total.saturating_sub(num_chrome + num_webkit).max(1);

    let mut families = Vec::with_capacity(num_chrome + num_webkit + num_firefox);
    families.extend(std::iter::repeat(BrowserFamily::Chromium).take(num_chrome));
    families.extend(std::iter::repeat(BrowserFamily::Webkit).take(num_webkit));
    families.extend(std::iter::repeat(BrowserFamily::Firefox).take(num_firefox));

    families.shuffle(rng);
    families.truncate(total);
    families
}

/// Build one descriptor per configured agent. Administrators come first in
/// the numbering space, then visitors; proxy ports are derived from fleet
/// position so they stay unique regardless of the family shuffle.
pub fn build_descriptors(config: &FleetConfig, rng: &mut impl Rng) -> Vec<AgentDescriptor> {
    let total = config.total_agents();
    let families = allocate_families(
        total,
        config.browser_chrome_pct,
        config.browser_webkit_pct,
        rng,
    );

    let mut descriptors = Vec::with_capacity(total);
    for (i, family) in families.into_iter().enumerate() {
        let (role, id) = if i < config.num_admins {
            (AgentRole::Administrator, format!("admin-{}", i + 1))
        } else {
            (AgentRole::Visitor, format!("visitor-{}", i + 1 - config.num_admins))
        };

        let proxy_port = config
            .proxy_enabled
            .then(|| config.proxy_base_port + i as u16);

        descriptors.push(AgentDescriptor {
            id,
            role,
            family,
            proxy_port,
        });
    }

    descriptors
}
