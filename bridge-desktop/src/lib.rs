//! # Desktop Bridge Implementations
//!
//! Default implementations of the host capability traits for desktop
//! platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `PreferencesStore` using a SQLite key-value table (`sqlx`)
//! - `NetworkMonitor` using TCP reachability probes
//! - `PathProvider` using the `dirs` crate
//! - `MediaBackend` as a clock-driven simulation (no decoding)
//! - `UrlLauncher` using the system opener (`xdg-open` / `open` / `start`)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopPathProvider, SqlitePreferencesStore};
//! use bridge_traits::PathProvider;
//!
//! #[tokio::main]
//! async fn main() {
//!     let paths = DesktopPathProvider::new("my-app");
//!     let support = paths.support_directory().await.unwrap().unwrap();
//!     let prefs = SqlitePreferencesStore::new(support.join("prefs.db")).await.unwrap();
//!
//!     // Hand both to the bridge configuration
//! }
//! ```

mod launcher;
mod media;
mod network;
mod paths;
mod preferences;

pub use launcher::SystemUrlLauncher;
pub use media::{SimulatedMediaBackend, SimulatedPlayer};
pub use network::{DesktopNetworkMonitor, DEFAULT_POLL_INTERVAL, DEFAULT_PROBE_ADDR};
pub use paths::DesktopPathProvider;
pub use preferences::SqlitePreferencesStore;
