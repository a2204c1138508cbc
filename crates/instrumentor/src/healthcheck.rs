use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use instrumentor_service::config::Config;

/// The address to probe for a server bound to `bind`.
///
/// A server bound to the unspecified address is reached through loopback.
fn probe_addr(bind: SocketAddr) -> SocketAddr {
    match bind.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => (Ipv4Addr::LOCALHOST, bind.port()).into(),
        IpAddr::V6(ip) if ip.is_unspecified() => (Ipv6Addr::LOCALHOST, bind.port()).into(),
        _ => bind,
    }
}

/// Probes the `/healthcheck` endpoint of a running instrumentor.
///
/// Prints `OK` or `ERROR` for use in container health checks.
pub fn healthcheck(config: &Config, addr: Option<SocketAddr>, timeout: u64) -> Result<()> {
    let addr = match addr {
        Some(addr) => addr,
        None => probe_addr(config.bind.parse().context("invalid bind address")?),
    };

    let result = probe(addr, Duration::from_secs(timeout));
    println!("{}", if result.is_ok() { "OK" } else { "ERROR" });
    result
}

fn probe(addr: SocketAddr, timeout: Duration) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;

    let url = format!("http://{addr}/healthcheck");
    tracing::debug!("Sending request to: {url}");

    let response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to check Instrumentor ({addr}) health"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Instrumentor ({addr}) is unhealthy. Status: {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_addr() {
        let addr = |s: &str| s.parse::<SocketAddr>().unwrap();

        assert_eq!(probe_addr(addr("0.0.0.0:9000")), addr("127.0.0.1:9000"));
        assert_eq!(probe_addr(addr("[::]:9000")), addr("[::1]:9000"));
        assert_eq!(probe_addr(addr("10.0.0.1:9000")), addr("10.0.0.1:9000"));
    }
}
