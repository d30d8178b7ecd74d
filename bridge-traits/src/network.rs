//! Network Connectivity Abstraction
//!
//! Provides the current connection type and a stream of connectivity changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Active connection type as reported to the application layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// WiFi (or WiMAX) connection
    Wifi,
    /// Cellular/mobile data connection
    Mobile,
    /// Wired connection
    Ethernet,
    /// No connection
    None,
}

impl Connectivity {
    /// Wire name of the connection type
    pub fn as_str(&self) -> &'static str {
        match self {
            Connectivity::Wifi => "wifi",
            Connectivity::Mobile => "mobile",
            Connectivity::Ethernet => "ethernet",
            Connectivity::None => "none",
        }
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network monitor trait
///
/// # Platform Support
///
/// - **Android**: ConnectivityManager + CONNECTIVITY_ACTION broadcasts
/// - **iOS/macOS**: Network framework path monitor
/// - **Desktop**: reachability probing
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::{Connectivity, NetworkMonitor};
///
/// async fn on_wifi(monitor: &dyn NetworkMonitor) -> bool {
///     matches!(monitor.check().await, Ok(Connectivity::Wifi))
/// }
/// ```
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get the current connection type
    async fn check(&self) -> Result<Connectivity>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        !matches!(self.check().await, Ok(Connectivity::None) | Err(_))
    }

    /// Subscribe to connectivity changes
    ///
    /// Implementations should emit a value whenever the connection type
    /// changes. Fails when the platform refuses to register a listener.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of connectivity changes
#[async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next connectivity update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<Connectivity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_wire_names() {
        assert_eq!(Connectivity::Wifi.as_str(), "wifi");
        assert_eq!(Connectivity::Mobile.to_string(), "mobile");
        assert_eq!(Connectivity::None.as_str(), "none");
    }
}
