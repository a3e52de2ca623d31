//! Device kind classification
//!
//! Case-insensitive substring match against a system description. Rules are
//! checked in order and the first hit wins.

use crate::models::DeviceKind;

/// Ordered keyword rules; generic role words come before vendor names
const KIND_RULES: &[(&[&str], DeviceKind)] = &[
    (&["router"], DeviceKind::Router),
    (&["switch"], DeviceKind::Switch),
    (&["server"], DeviceKind::Server),
    (&["controller", "wlc"], DeviceKind::Controller),
    (&["mikrotik", "routeros", "juniper", "junos", "vyos"], DeviceKind::Router),
    (&["cisco ios", "cisco", "procurve", "aruba", "netgear"], DeviceKind::Switch),
    (&["unifi", "meraki", "ruckus"], DeviceKind::Controller),
    (&["linux", "windows", "freebsd", "vmware esxi"], DeviceKind::Server),
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify a device from its SNMP sysDescr (or any free-text description)
pub fn classify_device_kind(description: &str) -> DeviceKind {
    let lower = description.to_lowercase();

    KIND_RULES
        .iter()
        .find(|(needles, _)| contains_any(&lower, needles))
        .map(|(_, kind)| *kind)
        .unwrap_or(DeviceKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_words_match_case_insensitively() {
        assert_eq!(classify_device_kind("Edge ROUTER 4"), DeviceKind::Router);
        assert_eq!(classify_device_kind("24-port Managed Switch"), DeviceKind::Switch);
        assert_eq!(classify_device_kind("Dell PowerEdge Server"), DeviceKind::Server);
    }

    #[test]
    fn test_vendor_names_classify() {
        assert_eq!(classify_device_kind("RouterOS RB4011"), DeviceKind::Router);
        assert_eq!(
            classify_device_kind("Cisco IOS Software, C2960 Software"),
            DeviceKind::Switch
        );
        assert_eq!(classify_device_kind("UniFi Network Application"), DeviceKind::Controller);
    }

    #[test]
    fn test_first_match_wins() {
        // role words outrank vendor names
        assert_eq!(classify_device_kind("MikroTik Cloud Router Switch"), DeviceKind::Router);
        assert_eq!(classify_device_kind("MikroTik CSS326 switch"), DeviceKind::Switch);
    }

    #[test]
    fn test_unknown_default() {
        assert_eq!(classify_device_kind(""), DeviceKind::Unknown);
        assert_eq!(classify_device_kind("HP LaserJet"), DeviceKind::Unknown);
    }
}
