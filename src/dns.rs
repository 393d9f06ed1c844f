//! MX record checks for the domains of extracted emails.

use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};

/// Answers whether a domain accepts mail.
#[async_trait]
pub trait MxVerifier: Send + Sync {
    /// `true` when the domain has at least one MX record, or when that cannot be determined.
    async fn has_mx(&self, domain: &str) -> bool;
}

/// Creates a configured DNS resolver instance.
pub fn create_resolver(config: &Config) -> Result<TokioAsyncResolver> {
    let mut resolver_config = ResolverConfig::new();

    for server_str in &config.dns_servers {
        match IpAddr::from_str(server_str) {
            Ok(ip_addr) => {
                let socket_addr = SocketAddr::new(ip_addr, 53);
                for protocol in [Protocol::Udp, Protocol::Tcp] {
                    resolver_config.add_name_server(NameServerConfig {
                        socket_addr,
                        protocol,
                        tls_dns_name: None,
                        trust_negative_responses: true,
                        bind_addr: None,
                    });
                }
            }
            Err(e) => {
                tracing::error!(
                    "Invalid DNS server IP address in config: '{}' - {}",
                    server_str,
                    e
                );
                return Err(AppError::Config(format!(
                    "Invalid DNS server IP address: {}",
                    server_str
                )));
            }
        }
    }

    let mut resolver_opts = ResolverOpts::default();
    resolver_opts.timeout = config.dns_timeout;
    resolver_opts.attempts = 2;

    let resolver = TokioAsyncResolver::tokio(resolver_config, resolver_opts);
    tracing::debug!("DNS resolver configured with {} servers.", config.dns_servers.len());
    Ok(resolver)
}

/// How a failed MX lookup is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupFailure {
    /// The domain definitely has no MX record.
    NoMx,
    /// The answer is unknown; the check fails open.
    Unknown,
}

/// Classifies a resolver error from its debug representation.
fn classify_failure(kind: &str) -> LookupFailure {
    if kind.contains("NoRecordsFound")
        || kind.contains("NXDomain")
        || kind.contains("Name does not exist")
        || kind.contains("Timeout")
    {
        LookupFailure::NoMx
    } else {
        LookupFailure::Unknown
    }
}

/// [`MxVerifier`] backed by a trust-dns Tokio resolver.
pub struct DnsMxVerifier {
    resolver: TokioAsyncResolver,
}

impl DnsMxVerifier {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            resolver: create_resolver(config)?,
        })
    }
}

#[async_trait]
impl MxVerifier for DnsMxVerifier {
    async fn has_mx(&self, domain: &str) -> bool {
        tracing::debug!(target: "mx_task", "Performing DNS MX lookup for {}", domain);

        match self.resolver.mx_lookup(domain).await {
            Ok(mx_response) => {
                let exchanges: Vec<String> = mx_response
                    .iter()
                    .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_string())
                    .filter(|exchange| !exchange.is_empty())
                    .collect();
                if exchanges.is_empty() {
                    tracing::warn!(target: "mx_task", "MX lookup for {} succeeded but yielded no usable records.", domain);
                    false
                } else {
                    tracing::debug!(target: "mx_task", "Found MX for {}: {:?}", domain, exchanges);
                    true
                }
            }
            Err(e) => {
                let error_string = format!("{:?}", e.kind());
                match classify_failure(&error_string) {
                    LookupFailure::NoMx => {
                        tracing::info!(target: "mx_task", "No MX records for {}: {}", domain, e);
                        false
                    }
                    LookupFailure::Unknown => {
                        tracing::warn!(target: "mx_task", "Unexpected DNS resolution error for {}: {}. Keeping its emails.", domain, e);
                        true
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("NoRecordsFound { query: ..., response_code: NXDomain }"),
            LookupFailure::NoMx
        );
        assert_eq!(classify_failure("Timeout"), LookupFailure::NoMx);
        assert_eq!(
            classify_failure("Io(Os { code: 101, kind: NetworkUnreachable })"),
            LookupFailure::Unknown
        );
    }

    #[test]
    fn test_create_resolver_rejects_bad_server() {
        let config = Config {
            dns_servers: vec!["not-an-ip".to_string()],
            ..Config::default()
        };
        assert!(matches!(create_resolver(&config), Err(AppError::Config(_))));
    }
}
