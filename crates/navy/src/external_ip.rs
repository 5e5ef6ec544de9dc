//! External address resolution for published ports
//!
//! Resolution order, first match wins:
//! 1. `NAVY_HOST` (deprecated, use `NAVY_EXTERNAL_IP`)
//! 2. `NAVY_EXTERNAL_IP`
//! 3. host from the environment settings, resolved to IPv4
//! 4. host of a `tcp://` `DOCKER_HOST`, resolved to IPv4
//! 5. `127.0.0.1`

use std::net::{IpAddr, Ipv4Addr};

pub const NAVY_HOST_VAR: &str = "NAVY_HOST";
pub const NAVY_EXTERNAL_IP_VAR: &str = "NAVY_EXTERNAL_IP";
pub const DOCKER_HOST_VAR: &str = "DOCKER_HOST";

const TCP_SCHEME: &str = "tcp://";
const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Failed to lookup hostname \"{host}\": {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lookup hostname \"{host}\": no IPv4 address")]
    NoIpv4 { host: String },
}

/// Inputs of the external address fallback chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIpResolver {
    navy_host: Option<String>,
    external_ip: Option<String>,
    configured_host: Option<String>,
    docker_host: Option<String>,
}

impl ExternalIpResolver {
    /// Resolver with no inputs, which always yields the loopback address
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver fed from the process environment.
    ///
    /// The variables are read once, here. Later changes to the environment are
    /// not picked up by this resolver.
    pub fn from_env() -> Self {
        Self {
            navy_host: non_empty_var(NAVY_HOST_VAR),
            external_ip: non_empty_var(NAVY_EXTERNAL_IP_VAR),
            configured_host: None,
            docker_host: non_empty_var(DOCKER_HOST_VAR),
        }
    }

    pub fn with_navy_host(mut self, value: impl Into<String>) -> Self {
        self.navy_host = Some(value.into());
        self
    }

    pub fn with_external_ip(mut self, value: impl Into<String>) -> Self {
        self.external_ip = Some(value.into());
        self
    }

    pub fn with_configured_host(mut self, host: Option<String>) -> Self {
        self.configured_host = host.filter(|h| !h.trim().is_empty());
        self
    }

    pub fn with_docker_host(mut self, value: impl Into<String>) -> Self {
        self.docker_host = Some(value.into());
        self
    }

    /// Walk the fallback chain
    pub async fn resolve(&self) -> Result<String, ResolutionError> {
        if let Some(host) = &self.navy_host {
            log::warn!("{} is deprecated, use {} instead", NAVY_HOST_VAR, NAVY_EXTERNAL_IP_VAR);
            return Ok(host.clone());
        }

        if let Some(ip) = &self.external_ip {
            return Ok(ip.clone());
        }

        if let Some(host) = &self.configured_host {
            return Ok(dns_lookup(host).await?.to_string());
        }

        if let Some(host) = self.docker_host.as_deref().and_then(docker_host_address) {
            // docker-machine or a remote engine
            return Ok(dns_lookup(host).await?.to_string());
        }

        Ok(LOCALHOST.to_string())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Host part of a `tcp://host:port` engine address
pub fn docker_host_address(docker_host: &str) -> Option<&str> {
    let idx = docker_host.find(TCP_SCHEME)?;
    let rest = &docker_host[idx + TCP_SCHEME.len()..];
    let rest = rest.split('/').next().unwrap_or(rest);
    let host = match rest.rfind(':') {
        Some(colon) => &rest[..colon],
        None => rest,
    };
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Resolve `host` to its first IPv4 address
pub async fn dns_lookup(host: &str) -> Result<Ipv4Addr, ResolutionError> {
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ResolutionError::Lookup {
            host: host.to_string(),
            source: e,
        })?;

    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| ResolutionError::NoIpv4 {
            host: host.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_navy_host_wins_over_everything() {
        let resolver = ExternalIpResolver::new()
            .with_navy_host("10.0.0.5")
            .with_external_ip("10.0.0.6")
            .with_configured_host(Some("192.168.1.1".to_string()))
            .with_docker_host("tcp://192.168.99.100:2376");
        assert_eq!(resolver.resolve().await.unwrap(), "10.0.0.5");
    }

    #[tokio::test]
    async fn test_external_ip_override() {
        let resolver = ExternalIpResolver::new()
            .with_external_ip("10.0.0.6")
            .with_docker_host("tcp://192.168.99.100:2376");
        assert_eq!(resolver.resolve().await.unwrap(), "10.0.0.6");
    }

    #[tokio::test]
    async fn test_configured_host_before_docker_host() {
        let resolver = ExternalIpResolver::new()
            .with_configured_host(Some("127.0.0.2".to_string()))
            .with_docker_host("tcp://192.168.99.100:2376");
        assert_eq!(resolver.resolve().await.unwrap(), "127.0.0.2");
    }

    #[tokio::test]
    async fn test_docker_host_is_resolved() {
        let resolver = ExternalIpResolver::new().with_docker_host("tcp://192.168.99.100:2376");
        assert_eq!(resolver.resolve().await.unwrap(), "192.168.99.100");
    }

    #[tokio::test]
    async fn test_unix_docker_host_falls_back_to_localhost() {
        let resolver = ExternalIpResolver::new().with_docker_host("unix:///var/run/docker.sock");
        assert_eq!(resolver.resolve().await.unwrap(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_no_inputs_is_localhost() {
        assert_eq!(ExternalIpResolver::new().resolve().await.unwrap(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_ipv6_only_host_is_a_resolution_error() {
        let resolver = ExternalIpResolver::new().with_configured_host(Some("::1".to_string()));
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ResolutionError::NoIpv4 { .. }));
    }

    #[test]
    fn test_blank_configured_host_is_ignored() {
        let resolver = ExternalIpResolver::new().with_configured_host(Some("  ".to_string()));
        assert_eq!(resolver, ExternalIpResolver::new());
    }

    #[test]
    fn test_docker_host_address() {
        assert_eq!(
            docker_host_address("tcp://192.168.99.100:2376"),
            Some("192.168.99.100")
        );
        assert_eq!(docker_host_address("tcp://docker.local"), Some("docker.local"));
        assert_eq!(docker_host_address("tcp://[::1]:2376"), Some("::1"));
        assert_eq!(docker_host_address("unix:///var/run/docker.sock"), None);
        assert_eq!(docker_host_address("tcp://:2376"), None);
    }
}
