//! # Host Bridge Traits
//!
//! Host capability traits that plugin adapters call into.
//!
//! ## Overview
//!
//! Each plugin exposes a narrow native capability to the application layer.
//! The plugin itself only decodes calls and encodes results; the capability
//! is provided by the host through one of the traits below, so the same
//! plugin code runs against Android, iOS, desktop or test doubles.
//!
//! ## Traits
//!
//! ### Storage
//! - [`PreferencesStore`](storage::PreferencesStore) - Typed key-value preferences
//! - [`PathProvider`](storage::PathProvider) - Well-known application directories
//!
//! ### Platform Integration
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity checks and change stream
//! - [`MediaBackend`](media::MediaBackend) - Native media players rendering to textures
//! - [`UrlLauncher`](launcher::UrlLauncher) - Hand URLs to the platform handler
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All traits use [`BridgeError`](error::BridgeError). Plugins convert it to a
//! wire error whose code is [`BridgeError::kind`], so implementations should
//! pick the variant that best names the failure rather than folding
//! everything into `OperationFailed`.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`: plugin handlers run on the bridge task
//! but hand work to spawned tasks that complete on arbitrary worker threads.

pub mod error;
pub mod launcher;
pub mod log;
pub mod media;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use launcher::{LaunchOptions, UrlLauncher};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use media::{MediaBackend, MediaEvent, MediaEventStream, MediaPlayer, MediaSource};
pub use network::{Connectivity, NetworkChangeStream, NetworkMonitor};
pub use storage::{PathProvider, PreferenceValue, PreferencesStore};
pub use time::{Clock, SystemClock};
