//! Device identity resolution.
//!
//! The collector keys each agent by a stable device identifier. The
//! identifier is derived from the host's network hardware: the MAC address
//! of the first interface (ordered by interface name) that carries a
//! non-zero hardware address, formatted as lowercase colon-separated hex.
//!
//! Resolution is deterministic for the lifetime of the process: the first
//! computed value is cached and returned on every subsequent call.

use std::sync::OnceLock;

use sysinfo::Networks;

/// Identifier used when no network interface exposes a usable hardware address.
const FALLBACK_IDENTIFIER: &str = "00:00:00:00:00:00";

static DEVICE_IDENTIFIER: OnceLock<String> = OnceLock::new();

/// Resolve the device identifier for this host.
///
/// Two calls on the same machine always return identical values. The value
/// is immutable once computed.
pub fn resolve() -> &'static str {
    DEVICE_IDENTIFIER.get_or_init(|| {
        let networks = Networks::new_with_refreshed_list();
        let interfaces = networks
            .iter()
            .map(|(name, data)| (name.clone(), data.mac_address().0));

        select_identifier(interfaces).unwrap_or_else(|| FALLBACK_IDENTIFIER.to_string())
    })
}

/// Pick the identifier from a set of (interface name, hardware address) pairs.
///
/// Interfaces with an all-zero address (loopback and virtual devices) are
/// skipped. The remaining candidates are ordered by interface name so the
/// same host always yields the same identifier regardless of enumeration
/// order.
fn select_identifier<I>(interfaces: I) -> Option<String>
where
    I: IntoIterator<Item = (String, [u8; 6])>,
{
    let mut candidates: Vec<(String, [u8; 6])> = interfaces
        .into_iter()
        .filter(|(_, mac)| *mac != [0u8; 6])
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    candidates.into_iter().next().map(|(_, mac)| format_mac(mac))
}

/// Format a hardware address as lowercase colon-separated hex.
fn format_mac(mac: [u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
