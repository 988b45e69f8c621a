use dns_lookup::{lookup_addr, lookup_host};
use std::net::IpAddr;

pub async fn resolve_hostname(hostname: &str, force_ipv4: bool, force_ipv6: bool) -> anyhow::Result<IpAddr> {
    // First try to parse as IP address
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return match (ip, force_ipv4, force_ipv6) {
            (IpAddr::V4(_), false, true) => Err(anyhow::anyhow!("IPv4 address provided but IPv6 forced")),
            (IpAddr::V6(_), true, false) => Err(anyhow::anyhow!("IPv6 address provided but IPv4 forced")),
            _ => Ok(ip),
        };
    }

    let addresses = tokio::task::spawn_blocking({
        let hostname = hostname.to_string();
        move || lookup_host(&hostname)
    })
    .await??;

    pick_address(hostname, &addresses, force_ipv4, force_ipv6)
}

/// Chooses one resolved address, preferring IPv4 unless IPv6 is forced.
fn pick_address(hostname: &str, addresses: &[IpAddr], force_ipv4: bool, force_ipv6: bool) -> anyhow::Result<IpAddr> {
    if addresses.is_empty() {
        return Err(anyhow::anyhow!("No addresses found for hostname: {}", hostname));
    }

    let filtered: Vec<IpAddr> = addresses
        .iter()
        .copied()
        .filter(|addr| match (addr, force_ipv4, force_ipv6) {
            (IpAddr::V4(_), false, true) => false,
            (IpAddr::V6(_), true, false) => false,
            _ => true,
        })
        .collect();

    if filtered.is_empty() {
        let version = if force_ipv4 { "IPv4" } else { "IPv6" };
        return Err(anyhow::anyhow!("No {} addresses found for hostname: {}", version, hostname));
    }

    let preferred = if force_ipv6 {
        filtered.iter().find(|addr| addr.is_ipv6())
    } else {
        filtered.iter().find(|addr| addr.is_ipv4())
    };

    preferred
        .or_else(|| filtered.first())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No suitable address found"))
}

pub async fn reverse_lookup(ip: IpAddr) -> Option<String> {
    tokio::task::spawn_blocking(move || lookup_addr(&ip).ok())
        .await
        .ok()
        .flatten()
}
