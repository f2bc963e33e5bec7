use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::future::Future;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use surge_ping::{Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, ICMP};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProbeError;

/// Answers whether a host is reachable right now.
#[async_trait]
pub trait Prober: Send + Sync {
    /// A single attempt bounded by `timeout`. `Ok(false)` means the host did
    /// not answer; `Err` means the check itself could not be carried out.
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool, ProbeError>;
}

/// ICMP echo raced against TCP connects to a few well-known ports.
pub struct NetworkProber {
    ping_v4: Option<PingClient>,
    ping_v6: Option<PingClient>,
    fallback_ports: Vec<u16>,
    dns_resolver: TokioResolver,
}

impl NetworkProber {
    pub fn new(use_icmp: bool, fallback_ports: Vec<u16>) -> Self {
        let (ping_v4, ping_v6) = if use_icmp {
            (
                Self::ping_client(ICMP::V4, "v4"),
                Self::ping_client(ICMP::V6, "v6"),
            )
        } else {
            (None, None)
        };

        let dns_resolver = TokioResolver::builder_with_config(
            ResolverConfig::cloudflare(),
            TokioConnectionProvider::default(),
        ).build();

        info!(
            icmp = ping_v4.is_some() || ping_v6.is_some(),
            ports = ?fallback_ports,
            "Prober ready (DNS via Cloudflare 1.1.1.1 / 1.0.0.1)"
        );

        Self { ping_v4, ping_v6, fallback_ports, dns_resolver }
    }

    fn ping_client(kind: ICMP, label: &str) -> Option<PingClient> {
        let config = PingConfig::builder().kind(kind).build();
        match PingClient::new(&config) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("ICMP {} unavailable, relying on TCP checks: {}", label, e);
                None
            }
        }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        let lookup = self.dns_resolver.lookup_ip(host).await.map_err(|e| ProbeError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
        lookup.iter().next().ok_or_else(|| ProbeError::NoAddress(host.to_string()))
    }

    async fn reach(&self, ip: IpAddr, timeout: Duration) -> bool {
        let mut attempts: FuturesUnordered<BoxFuture<'_, bool>> = FuturesUnordered::new();
        let client = if ip.is_ipv4() { self.ping_v4.as_ref() } else { self.ping_v6.as_ref() };
        if let Some(client) = client {
            attempts.push(Self::check_ping(client, ip, timeout).boxed());
        }
        for &port in &self.fallback_ports {
            attempts.push(Self::check_tcp(ip, port, timeout).boxed());
        }
        if attempts.is_empty() {
            warn!(%ip, "No ICMP client and no fallback ports; treating host as unreachable");
            return false;
        }

        while let Some(answered) = attempts.next().await {
            if answered {
                return true;
            }
        }
        false
    }

    async fn check_ping(client: &PingClient, ip: IpAddr, timeout: Duration) -> bool {
        let payload = [0u8; 56];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);
        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, latency)) => {
                debug!(%ip, latency_ms = latency.as_secs_f64() * 1000.0, "ICMP response");
                true
            }
            Err(e) => {
                debug!(%ip, "ICMP failed: {}", e);
                false
            }
        }
    }

    /// A refused connection still proves the host is up.
    async fn check_tcp(ip: IpAddr, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::new(ip, port);
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => true,
            Ok(Err(e)) => {
                debug!(%addr, "TCP check failed: {}", e);
                false
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool, ProbeError> {
        let deadline = Instant::now() + timeout;
        let ip = resolved_by(deadline, host, self.resolve(host)).await?;
        let answered = answered_by(deadline, self.reach(ip, timeout)).await;
        if !answered {
            debug!(host, %ip, "No answer within {:?}", timeout);
        }
        Ok(answered)
    }
}

/// A lookup still running at the deadline is a failed check, not a silent host.
async fn resolved_by<F>(deadline: Instant, host: &str, lookup: F) -> Result<IpAddr, ProbeError>
where
    F: Future<Output = Result<IpAddr, ProbeError>>,
{
    tokio::time::timeout_at(deadline, lookup)
        .await
        .unwrap_or_else(|_| Err(ProbeError::ResolveTimeout(host.to_string())))
}

async fn answered_by<F: Future<Output = bool>>(deadline: Instant, attempts: F) -> bool {
    tokio::time::timeout_at(deadline, attempts).await.unwrap_or(false)
}
