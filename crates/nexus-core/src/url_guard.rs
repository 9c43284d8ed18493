//! Classification of outbound URLs before any server-initiated request.
//!
//! This is a literal check on the URL text. Hostnames are not resolved, so a
//! public name that resolves to a private address is not caught here.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

const BLOCKED_HOST_SUFFIXES: [&str; 2] = [".local", ".internal"];

/// Returns `true` when `raw` must not be contacted. Unparseable input is
/// treated as private.
#[must_use]
pub fn is_private_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return true;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }

    match url.host() {
        None => true,
        Some(Host::Ipv4(ip)) => is_private_ipv4(ip),
        Some(Host::Ipv6(ip)) => is_private_ipv6(ip),
        Some(Host::Domain(domain)) => is_private_domain(domain),
    }
}

#[must_use]
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

fn is_private_domain(domain: &str) -> bool {
    let host = domain.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    if BLOCKED_HOST_SUFFIXES
        .iter()
        .any(|suffix| host.ends_with(suffix))
    {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(is_private_ip)
}

// 0/8, 127/8, 10/8, 100.64/10, 172.16/12, 192.168/16, 169.254/16, broadcast.
fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    first == 0
        || (first == 100 && second & 0xc0 == 64)
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
}

// fe80::/10, fc00::/7, and anything carrying an IPv4 address by that address.
fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(embedded) = embedded_ipv4(ip) {
        return is_private_ipv4(embedded);
    }
    let first = ip.segments()[0];
    first & 0xffc0 == 0xfe80 || first & 0xfe00 == 0xfc00
}

/// IPv4-mapped (`::ffff:a.b.c.d`), IPv4-compatible (`::a.b.c.d`, which also
/// covers `::` and `::1`) and NAT64 well-known prefix (`64:ff9b::/96`).
fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4() {
        return Some(v4);
    }
    let segments = ip.segments();
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        let [.., high, low] = segments;
        return Some(Ipv4Addr::from((u32::from(high) << 16) | u32::from(low)));
    }
    None
}
