//! Resolves whether an SSRF candidate target points at a private/internal
//! network, fail-closed: any parse, resolution, or timeout error is treated
//! as private rather than risk a bypass.

use std::net::ToSocketAddrs;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

static PRIVATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^127\.",
        r"^localhost$",
        r"^169\.254\.",
        r"^10\.",
        r"^192\.168\.",
        r"^172\.(1[6-9]|2[0-9]|3[0-1])\.",
        r"^0\.",
        r"^::1$",
        r"^fc00:",
        r"^fe80:",
    ]
    .iter()
    .map(|p| {
        RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .expect("valid private-ip pattern")
    })
    .collect()
});

fn matches_private_pattern(value: &str) -> bool {
    PRIVATE_PATTERNS.iter().any(|p| p.is_match(value))
}

/// Resolves `hostname:80` via the std resolver on a blocking thread, bounded
/// by `RESOLVE_TIMEOUT`. Returns the resolved IPs, or `None` on any failure
/// or timeout — callers must treat `None` as "assume private".
async fn resolve(hostname: String) -> Option<Vec<std::net::IpAddr>> {
    let resolve_task = tokio::task::spawn_blocking(move || {
        (hostname.as_str(), 80u16)
            .to_socket_addrs()
            .map(|addrs| addrs.map(|a| a.ip()).collect::<Vec<_>>())
    });

    match tokio::time::timeout(RESOLVE_TIMEOUT, resolve_task).await {
        Ok(Ok(Ok(addrs))) if !addrs.is_empty() => Some(addrs),
        _ => None,
    }
}

/// Mirrors `_is_private_target`: prepend a scheme if missing, parse the
/// host, resolve it, and check both the resolved address and the raw
/// hostname against the private-network pattern table.
pub async fn is_private_target(target: &str) -> bool {
    let with_scheme = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{}", target)
    };

    let parsed = match url::Url::parse(&with_scheme) {
        Ok(u) => u,
        Err(_) => return true,
    };

    let hostname = match parsed.host_str() {
        Some(h) => h.to_string(),
        None => return true,
    };

    if matches_private_pattern(&hostname) {
        return true;
    }

    match resolve(hostname.clone()).await {
        Some(addrs) => addrs
            .iter()
            .any(|ip| matches_private_pattern(&ip.to_string())),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_hostname_is_private() {
        assert!(is_private_target("127.0.0.1").await);
    }

    #[tokio::test]
    async fn literal_localhost_is_private() {
        assert!(is_private_target("localhost").await);
    }

    #[tokio::test]
    async fn link_local_metadata_ip_is_private() {
        assert!(is_private_target("169.254.169.254").await);
    }

    #[tokio::test]
    async fn rfc1918_ip_is_private() {
        assert!(is_private_target("http://10.0.0.5/secrets").await);
        assert!(is_private_target("192.168.1.1").await);
    }

    #[tokio::test]
    async fn unparseable_target_is_treated_as_private() {
        assert!(is_private_target("http://[::::::]").await);
    }

    #[tokio::test]
    async fn unresolvable_hostname_is_treated_as_private() {
        assert!(is_private_target("this-host-does-not-exist.invalid").await);
    }

    #[test]
    fn ula_and_link_local_ipv6_match_pattern_table() {
        assert!(matches_private_pattern("fc00::1"));
        assert!(matches_private_pattern("fe80::1"));
        assert!(matches_private_pattern("::1"));
    }
}
