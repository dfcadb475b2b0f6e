//! TOWER link protocol
//!
//! Discovery rules and connection timing for the grow-tower firmware. The
//! attribute table itself lives in [`crate::domain::attributes`].

use crate::domain::models::Advertisement;

/// Name the firmware advertises under
pub const TARGET_DEVICE_NAME: &str = "TOWER";

/// Default scan window in milliseconds
pub const SCAN_TIMEOUT_MS: u64 = 10_000;

/// Default connect/GATT handshake timeout in milliseconds
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Pause after connecting before the attribute table is queried
pub const STABILIZATION_DELAY_MS: u64 = 1_500;

/// Group lookup attempts right after connecting
pub const GROUP_RESOLVE_ATTEMPTS: u32 = 3;

/// Delay between group lookup attempts in milliseconds
pub const GROUP_RETRY_DELAY_MS: u64 = 1_000;

/// Which advertisements a scan reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFilter {
    /// Exact, case-sensitive match against the cached or advertised name
    Name(String),
    /// Every device, for manual selection
    All,
}

impl DiscoveryFilter {
    #[cfg(test)]
    pub fn target() -> Self {
        Self::Name(TARGET_DEVICE_NAME.to_string())
    }

    pub fn matches(&self, adv: &Advertisement) -> bool {
        match self {
            Self::All => true,
            Self::Name(target) => {
                adv.cached_name.as_deref() == Some(target.as_str())
                    || adv.advertised_name.as_deref() == Some(target.as_str())
            }
        }
    }

    /// Whether a scan should stop on its first hit
    pub fn stops_on_first_match(&self) -> bool {
        matches!(self, Self::Name(_))
    }
}
