//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{Connectivity, NetworkChangeStream, NetworkMonitor},
};
use std::time::Duration;
use tracing::debug;

/// Default reachability probe (a public DNS resolver)
pub const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";

/// Default interval between probes of a change stream
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Desktop network monitor implementation
///
/// Detects connectivity by opening a TCP connection to a probe address.
/// Desktop platforms do not expose the link type without platform APIs
/// (netlink, SystemConfiguration, WinAPI), so a reachable probe reports the
/// configured connected kind, `ethernet` by default.
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    probe: String,
    poll_interval: Duration,
    connected_kind: Connectivity,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe: DEFAULT_PROBE_ADDR.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            connected_kind: Connectivity::Ethernet,
        }
    }

    /// Probe a different `host:port`
    pub fn with_probe(mut self, probe: impl Into<String>) -> Self {
        self.probe = probe.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Kind reported while the probe is reachable
    pub fn with_connected_kind(mut self, kind: Connectivity) -> Self {
        self.connected_kind = kind;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn probe(&self) -> Connectivity {
        let connect = tokio::net::TcpStream::connect(self.probe.as_str());
        match tokio::time::timeout(PROBE_TIMEOUT, connect).await {
            Ok(Ok(_)) => self.connected_kind,
            Ok(Err(_)) | Err(_) => Connectivity::None,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn check(&self) -> Result<Connectivity> {
        let connectivity = self.probe().await;
        debug!(probe = %self.probe, connectivity = %connectivity, "Connectivity probed");
        Ok(connectivity)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            last: None,
        }))
    }
}

/// Change stream that polls the probe
///
/// The first `next` reports the current state immediately; later calls
/// return only when the state changes.
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last: Option<Connectivity>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<Connectivity> {
        loop {
            if self.last.is_some() {
                tokio::time::sleep(self.monitor.poll_interval).await;
            }

            let current = self.monitor.probe().await;
            if self.last != Some(current) {
                self.last = Some(current);
                return Some(current);
            }
        }
    }
}
