use std::net::IpAddr;

use crate::protocol::UNKNOWN_MAC;

/// Format hardware address bytes as uppercase hyphenated hex, e.g. `08-00-27-DC-4A-9E`.
/// Absent or empty input yields the `"unknown"` sentinel.
pub fn format_mac(bytes: Option<&[u8]>) -> String {
    match bytes {
        Some(bytes) if !bytes.is_empty() => bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join("-"),
        _ => UNKNOWN_MAC.to_string(),
    }
}

/// Split a beacon payload into its name line and optional MAC line.
///
/// Invalid UTF-8 is decoded lossily so a garbled beacon still yields a name.
pub fn split_beacon(payload: &[u8]) -> (String, Option<String>) {
    let text = String::from_utf8_lossy(payload);

    match text.split_once('\n') {
        Some((name, rest)) => {
            let mac = rest.lines().next().unwrap_or("").trim();
            let mac = (!mac.is_empty()).then(|| mac.to_string());
            (name.trim_end_matches('\r').to_string(), mac)
        }
        None => (text.into_owned(), None),
    }
}

/// 169.254.0.0/16 and fe80::/10
pub fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// Addresses that say an interface is up but are never useful as an end target.
pub fn is_local_only(ip: &IpAddr) -> bool {
    ip.is_loopback() || is_link_local(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_format_mac() {
        let bytes = [0x08, 0x00, 0x27, 0xDC, 0x4A, 0x9E];
        assert_eq!(format_mac(Some(&bytes)), "08-00-27-DC-4A-9E");
    }

    #[test]
    fn test_format_mac_absent() {
        assert_eq!(format_mac(None), UNKNOWN_MAC);
        assert_eq!(format_mac(Some(&[])), UNKNOWN_MAC);
    }

    #[test]
    fn test_split_beacon_with_mac() {
        let (name, mac) = split_beacon(b"Alice\n08-00-27-DC-4A-9E");
        assert_eq!(name, "Alice");
        assert_eq!(mac.as_deref(), Some("08-00-27-DC-4A-9E"));
    }

    #[test]
    fn test_split_beacon_tolerates_crlf_and_blank_mac() {
        let (name, mac) = split_beacon(b"Bob\r\n08-00-27-DC-4A-9E\r\n");
        assert_eq!(name, "Bob");
        assert_eq!(mac.as_deref(), Some("08-00-27-DC-4A-9E"));

        let (name, mac) = split_beacon(b"Carol\n");
        assert_eq!(name, "Carol");
        assert_eq!(mac, None);
    }

    #[test]
    fn test_split_beacon_is_permissive() {
        let (name, mac) = split_beacon(b"discovering");
        assert_eq!(name, "discovering");
        assert_eq!(mac, None);

        let (name, mac) = split_beacon(b"");
        assert_eq!(name, "");
        assert_eq!(mac, None);

        let (name, mac) = split_beacon(&[0x66, 0x6f, 0xff, 0x6f]);
        assert_eq!(name, "fo\u{FFFD}o");
        assert_eq!(mac, None);
    }

    #[test]
    fn test_local_only_addresses() {
        assert!(is_local_only(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_local_only(&IpAddr::V4(Ipv4Addr::new(169, 254, 3, 4))));
        assert!(is_local_only(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_local_only(&IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 1, 2, 3, 4))));
        assert!(!is_local_only(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
        assert!(!is_local_only(&IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 1, 0, 0, 0, 1))));
    }
}
