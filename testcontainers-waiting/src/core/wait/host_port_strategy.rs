use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use itertools::Itertools;
use tokio::net::TcpStream;
use url::Host;

use crate::core::{
    env::{Config, Os},
    error::{ConfigurationError, Result},
    wait::{poll::PollLoop, StrategyKind, WaitStrategy},
    WaitTarget,
};

/// Waits until the container's ports accept TCP connections on the host.
///
/// Without explicit ports, every exposed port is checked. A container without any port to
/// check is considered ready right away.
#[derive(Debug, Clone)]
pub struct HostPortWaitStrategy {
    ports: Option<BTreeSet<u16>>,
    startup_timeout: Duration,
    poll_interval: Duration,
    connect_timeout: Duration,
}

impl HostPortWaitStrategy {
    /// Create a new `HostPortWaitStrategy` checking all exposed ports.
    pub fn new() -> Self {
        let config = Config::load::<Os>();
        Self {
            ports: None,
            startup_timeout: config.startup_timeout(),
            poll_interval: config.poll_interval(Duration::from_millis(500)),
            connect_timeout: Duration::from_secs(1),
        }
    }

    /// Check only the given container ports. They are mapped to host ports before polling.
    ///
    /// An empty set means there is nothing to check.
    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports = Some(ports.into_iter().collect());
        self
    }

    /// Set the maximum time to wait for the ports.
    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Set the time to wait between two passes over the ports.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the time a single connection attempt may take.
    ///
    /// Keep it well below the startup timeout, an attempt is never interrupted by the latter.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    async fn host_ports(&self, target: &dyn WaitTarget) -> Result<BTreeSet<u16>> {
        let Some(ports) = &self.ports else {
            return Ok(target.liveness_check_ports().await?);
        };

        let mut host_ports = BTreeSet::new();
        for port in ports {
            host_ports.insert(target.mapped_port(*port).await?);
        }
        Ok(host_ports)
    }
}

impl Default for HostPortWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStrategy for HostPortWaitStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HostPort
    }

    fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    fn set_startup_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ConfigurationError> {
        self.startup_timeout = timeout;
        Ok(())
    }

    async fn wait_until_ready(&mut self, target: &dyn WaitTarget) -> Result<()> {
        let host_ports = self.host_ports(target).await?;
        if host_ports.is_empty() {
            log::debug!(
                "{}: No ports to wait for, considering container ready",
                target.container_id()
            );
            return Ok(());
        }

        let host = target.host().await?;
        log::info!(
            "{}: Waiting for {:?} for host port(s) {} on {host}",
            target.container_id(),
            self.startup_timeout,
            host_ports.iter().join(", ")
        );

        let mut poll = PollLoop::start(self.kind(), self.startup_timeout, self.poll_interval);
        loop {
            let mut unreachable = vec![];
            for port in &host_ports {
                if !is_listening(&host, *port, self.connect_timeout).await {
                    unreachable.push(*port);
                }
            }

            if unreachable.is_empty() {
                log::info!("{}: All host ports are reachable", target.container_id());
                return Ok(());
            }

            poll.retry(format!(
                "port(s) {} not reachable on {host}",
                unreachable.iter().join(", ")
            ))
            .await?;
        }
    }
}

async fn is_listening(host: &Host, port: u16, connect_timeout: Duration) -> bool {
    let connect = async {
        match host {
            Host::Domain(domain) => TcpStream::connect((domain.as_str(), port)).await,
            Host::Ipv4(ip) => TcpStream::connect((*ip, port)).await,
            Host::Ipv6(ip) => TcpStream::connect((*ip, port)).await,
        }
    };

    match tokio::time::timeout(connect_timeout, connect).await {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            log::trace!("Connection to {host}:{port} failed: {err}");
            false
        }
        Err(_) => {
            log::trace!("Connection to {host}:{port} timed out after {connect_timeout:?}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::core::{
        error::{TargetError, WaitError},
        target::mock::MockTarget,
    };

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn no_ports_is_ready_immediately() {
        let target = MockTarget::new();

        HostPortWaitStrategy::new()
            .with_startup_timeout(Duration::ZERO)
            .wait_until_ready(&target)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn explicit_empty_port_set_ignores_exposed_ports() {
        let target = MockTarget::new().with_port(80, closed_port().await);

        HostPortWaitStrategy::new()
            .with_ports([])
            .with_startup_timeout(Duration::ZERO)
            .wait_until_ready(&target)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn succeeds_when_every_port_accepts_connections() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = MockTarget::new()
            .with_port(5432, first.local_addr().unwrap().port())
            .with_port(8080, second.local_addr().unwrap().port());

        HostPortWaitStrategy::new()
            .with_startup_timeout(Duration::from_secs(5))
            .wait_until_ready(&target)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn times_out_listing_unreachable_ports() {
        let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = closed_port().await;
        let target = MockTarget::new()
            .with_port(80, open.local_addr().unwrap().port())
            .with_port(81, closed);

        let err = HostPortWaitStrategy::new()
            .with_startup_timeout(Duration::from_millis(300))
            .with_poll_interval(Duration::from_millis(50))
            .with_connect_timeout(Duration::from_millis(100))
            .wait_until_ready(&target)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WaitError::Timeout { kind: StrategyKind::HostPort, ref detail, .. }
                if *detail == format!("port(s) {closed} not reachable on 127.0.0.1")
        ));
    }

    #[tokio::test]
    async fn unmapped_explicit_port_fails_immediately() {
        let target = MockTarget::new();

        let err = HostPortWaitStrategy::new()
            .with_ports([6379])
            .wait_until_ready(&target)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WaitError::Target(TargetError::PortNotMapped { port: 6379, .. })
        ));
    }
}
