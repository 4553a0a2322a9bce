//! URL validation for SSRF protection.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{RadarError, RadarResult};

/// URL validator applied before every fetch, on every pool.
///
/// Blocks:
/// - Non-HTTP(S) schemes (file://, ftp://)
/// - Internal hostnames (localhost, *.local, cloud metadata)
/// - Private, loopback, link-local and reserved ranges (IPv4 and IPv6),
///   both for literal IPs and for every address the hostname resolves to
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "[::1]",
                "0.0.0.0",
                "metadata.google.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: vec![
                "10.0.0.0/8".parse().unwrap(),
                "172.16.0.0/12".parse().unwrap(),
                "192.168.0.0/16".parse().unwrap(),
                "169.254.0.0/16".parse().unwrap(), // Link-local / cloud metadata
                "127.0.0.0/8".parse().unwrap(),    // Loopback
                "100.64.0.0/10".parse().unwrap(),  // CGNAT
                "224.0.0.0/4".parse().unwrap(),    // Multicast
                "240.0.0.0/4".parse().unwrap(),    // Reserved
                "0.0.0.0/8".parse().unwrap(),      // Unspecified
                "::1/128".parse().unwrap(),        // IPv6 loopback
                "::/128".parse().unwrap(),         // IPv6 unspecified
                "fc00::/7".parse().unwrap(),       // IPv6 private
                "fe80::/10".parse().unwrap(),      // IPv6 link-local
                "ff00::/8".parse().unwrap(),       // IPv6 multicast
            ],
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses validation). Test fixtures only.
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Syntactic validation: scheme, hostname, literal-IP ranges.
    pub fn validate(&self, url: &str) -> RadarResult<()> {
        let parsed = url::Url::parse(url)
            .map_err(|e| RadarError::Policy(format!("invalid url {url}: {e}")))?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(RadarError::Policy(format!(
                "disallowed scheme: {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| RadarError::Policy(format!("url has no host: {url}")))?;

        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        if self.blocked_hosts.contains(host) || host.ends_with(".local") {
            return Err(RadarError::Policy(format!("blocked host: {host}")));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            self.check_ip(&ip, host)?;
        }

        Ok(())
    }

    /// Validate and resolve DNS to check every resolved address. Catches
    /// rebinding: a public hostname pointing at an internal IP.
    pub async fn validate_with_dns(&self, url: &str) -> RadarResult<()> {
        self.validate(url)?;

        let parsed = url::Url::parse(url)
            .map_err(|e| RadarError::Policy(format!("invalid url {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| RadarError::Policy(format!("url has no host: {url}")))?;

        if self.allowed_hosts.contains(host) || host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        let port = parsed.port().unwrap_or(match parsed.scheme() {
            "https" => 443,
            _ => 80,
        });

        let addrs = tokio::net::lookup_host(format!("{host}:{port}"))
            .await
            .map_err(|e| RadarError::Transport(format!("dns resolution for {host}: {e}")))?;

        for addr in addrs {
            self.check_ip(&addr.ip(), host)?;
        }

        Ok(())
    }

    fn check_ip(&self, ip: &IpAddr, host: &str) -> RadarResult<()> {
        for cidr in &self.blocked_cidrs {
            if cidr.contains(ip) {
                return Err(RadarError::Policy(format!(
                    "{host} resolves to blocked address {ip}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_localhost() {
        let v = UrlValidator::new();
        assert!(v.validate("http://localhost/").is_err());
        assert!(v.validate("http://127.0.0.1/").is_err());
        assert!(v.validate("http://[::1]/").is_err());
    }

    #[test]
    fn blocks_private_and_reserved_ranges() {
        let v = UrlValidator::new();
        assert!(v.validate("http://10.0.0.1/").is_err());
        assert!(v.validate("http://172.16.0.1/").is_err());
        assert!(v.validate("http://192.168.1.1/").is_err());
        assert!(v.validate("http://100.64.0.1/").is_err());
        assert!(v.validate("http://224.0.0.1/").is_err());
        assert!(v.validate("http://[fe80::1]/").is_err());
        assert!(v.validate("http://[fd00::1]/").is_err());
    }

    #[test]
    fn blocks_metadata_services() {
        let v = UrlValidator::new();
        assert!(v.validate("http://169.254.169.254/").is_err());
        assert!(v.validate("http://metadata.google.internal/").is_err());
    }

    #[test]
    fn blocks_non_http_schemes() {
        let v = UrlValidator::new();
        assert!(v.validate("file:///etc/passwd").is_err());
        assert!(v.validate("ftp://example.com/").is_err());
    }

    #[test]
    fn blocks_dot_local() {
        let v = UrlValidator::new();
        assert!(v.validate("http://printer.local/").is_err());
    }

    #[test]
    fn allows_public_urls() {
        let v = UrlValidator::new();
        assert!(v.validate("https://www.gov.br/planalto").is_ok());
        assert!(v.validate("https://example.com/feed.xml").is_ok());
    }

    #[test]
    fn allowed_hosts_bypass() {
        let v = UrlValidator::new().allow_host("localhost");
        assert!(v.validate("http://localhost/").is_ok());
    }

    #[test]
    fn policy_error_class() {
        let v = UrlValidator::new();
        let err = v.validate("http://10.0.0.1/").unwrap_err();
        assert_eq!(err.class(), "Policy");
    }
}
