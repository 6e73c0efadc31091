//! Address screening applied before every database lookup.
//!
//! Private, loopback, link-local and otherwise reserved ranges never
//! carry a meaningful location, so they are rejected here without
//! touching the database. The check is pure and deterministic.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use stream_atlas_geoip_models::UnresolvedReason;

/// Screens an address string for lookup.
///
/// Returns the parsed address if it is a public unicast address worth
/// looking up.
///
/// # Errors
///
/// Returns [`UnresolvedReason::Malformed`] if the text is not a valid
/// IPv4/IPv6 address, or [`UnresolvedReason::PrivateOrReserved`] if it
/// lies in a non-routable range.
pub fn screen(address: &str) -> Result<IpAddr, UnresolvedReason> {
    let ip: IpAddr = address
        .trim()
        .parse()
        .map_err(|_| UnresolvedReason::Malformed)?;

    if is_reserved(ip) {
        return Err(UnresolvedReason::PrivateOrReserved);
    }

    Ok(ip)
}

/// Returns `true` if the address lies in a private or reserved range.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are judged by their
/// IPv4 form.
#[must_use]
pub fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or_else(|| is_reserved_v6(v6), is_reserved_v4),
    }
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 shared address space (carrier-grade NAT)
        || (a == 100 && (b & 0xC0) == 64)
        // 240.0.0.0/4 reserved for future use
        || a >= 240
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();

    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_unique_local()
        || ip.is_unicast_link_local()
        // 2001:db8::/32 documentation
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_public_addresses() {
        assert!(screen("8.8.8.8").is_ok());
        assert!(screen("128.101.101.101").is_ok());
        assert!(screen("2606:4700:4700::1111").is_ok());
        assert!(screen(" 1.1.1.1 ").is_ok());
    }

    #[test]
    fn rejects_rfc1918_ranges() {
        for ip in [
            "10.0.0.1",
            "10.255.255.255",
            "172.16.0.1",
            "172.20.10.4",
            "172.31.255.255",
            "192.168.0.1",
            "192.168.1.5",
        ] {
            assert_eq!(
                screen(ip),
                Err(UnresolvedReason::PrivateOrReserved),
                "{ip} should be private"
            );
        }
    }

    #[test]
    fn does_not_overreach_rfc1918_boundaries() {
        assert!(screen("172.15.255.255").is_ok());
        assert!(screen("172.32.0.1").is_ok());
        assert!(screen("11.0.0.1").is_ok());
        assert!(screen("192.169.0.1").is_ok());
    }

    #[test]
    fn rejects_other_reserved_ranges() {
        for ip in [
            "127.0.0.1",
            "169.254.10.20",
            "0.0.0.0",
            "255.255.255.255",
            "224.0.0.1",
            "100.64.0.1",
            "198.51.100.7",
            "::1",
            "::",
            "fe80::1",
            "fd12:3456::1",
            "ff02::1",
            "2001:db8::1",
            "::ffff:192.168.1.1",
        ] {
            assert_eq!(
                screen(ip),
                Err(UnresolvedReason::PrivateOrReserved),
                "{ip} should be reserved"
            );
        }
    }

    #[test]
    fn ipv4_mapped_public_is_accepted() {
        assert!(screen("::ffff:8.8.8.8").is_ok());
    }

    #[test]
    fn rejects_malformed_text() {
        for text in ["", "abc", "999.1.1.1", "1.2.3", "192.168.1.5.6", "::g"] {
            assert_eq!(
                screen(text),
                Err(UnresolvedReason::Malformed),
                "{text:?} should be malformed"
            );
        }
    }
}
