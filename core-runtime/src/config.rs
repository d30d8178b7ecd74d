//! # Bridge Configuration
//!
//! Builder-based configuration for the plugin bridge runtime.
//!
//! ## Overview
//!
//! [`BridgeConfig`] carries the host capabilities the first-party plugins
//! call into, plus the tunables of the channel layer (inbound queue size,
//! listen policies, preference prefix, connectivity poll interval). The
//! builder fails fast: a config that would leave a plugin without its
//! capability is rejected at build time with an actionable message instead
//! of surfacing later as a not-implemented reply.
//!
//! ## Required Dependencies
//!
//! - `PreferencesStore` - Backing store of the shared preferences plugin
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Connectivity plugin
//! - `PathProvider` - Path provider plugin
//! - `MediaBackend` - Video player plugin
//! - `UrlLauncher` - URL launcher plugin
//!
//! A plugin whose optional capability is absent is simply not attached.
//! With the `desktop-shims` feature every capability gets a desktop default
//! from `bridge-desktop` when not injected.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::BridgeConfig;
//! use core_channel::ListenPolicy;
//!
//! let config = BridgeConfig::builder()
//!     .app_name("my-app")
//!     .preferences_store(store)
//!     .inbound_capacity(128)
//!     .listen_policy("plugins.flutter.io/connectivity_status", ListenPolicy::Reject)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{MediaBackend, NetworkMonitor, PathProvider, PreferencesStore, UrlLauncher};
use core_channel::{ListenPolicies, ListenPolicy};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default inbound queue capacity
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// Upper bound on the inbound queue capacity
pub const MAX_INBOUND_CAPACITY: usize = 65_536;

/// Default connectivity poll interval
pub const DEFAULT_NETWORK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest accepted connectivity poll interval
pub const MIN_NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Application name used for desktop directories when none is set
pub const DEFAULT_APP_NAME: &str = "plugin-bridge";

/// File name of the default preferences database
pub const PREFERENCES_FILE: &str = "shared_preferences.db";

/// Plugin bridge configuration.
///
/// Use [`BridgeConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Namespace for application-owned directories
    pub app_name: String,

    /// Capacity of the inbound call queue
    pub inbound_capacity: usize,

    /// Policy for a second `listen` on an Active event channel
    pub default_listen_policy: ListenPolicy,

    /// Per-channel listen policy overrides
    pub listen_overrides: BTreeMap<String, ListenPolicy>,

    /// Key prefix `getAll` and `clear` are restricted to
    pub preferences_prefix: String,

    /// How often the connectivity monitor re-checks
    pub network_poll_interval: Duration,

    /// Shared preferences backing store (required)
    pub preferences_store: Arc<dyn PreferencesStore>,

    /// Connectivity source (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Well-known directories (optional)
    pub path_provider: Option<Arc<dyn PathProvider>>,

    /// Native video players (optional)
    pub media_backend: Option<Arc<dyn MediaBackend>>,

    /// URL handler (optional)
    pub url_launcher: Option<Arc<dyn UrlLauncher>>,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("app_name", &self.app_name)
            .field("inbound_capacity", &self.inbound_capacity)
            .field("default_listen_policy", &self.default_listen_policy)
            .field("listen_overrides", &self.listen_overrides)
            .field("preferences_prefix", &self.preferences_prefix)
            .field("network_poll_interval", &self.network_poll_interval)
            .field("preferences_store", &"PreferencesStore { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field(
                "path_provider",
                &self.path_provider.as_ref().map(|_| "PathProvider { ... }"),
            )
            .field(
                "media_backend",
                &self.media_backend.as_ref().map(|_| "MediaBackend { ... }"),
            )
            .field(
                "url_launcher",
                &self.url_launcher.as_ref().map(|_| "UrlLauncher { ... }"),
            )
            .finish()
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Listen policy table handed to the plugin host.
    pub fn listen_policies(&self) -> ListenPolicies {
        self.listen_overrides.iter().fold(
            ListenPolicies::new(self.default_listen_policy),
            |policies, (channel, policy)| policies.with_override(channel.clone(), *policy),
        )
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The app name is not empty
    /// - The inbound capacity is within `1..=MAX_INBOUND_CAPACITY`
    /// - The poll interval is at least `MIN_NETWORK_POLL_INTERVAL`
    /// - Override channel names are not empty
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(Error::InvalidSetting {
                setting: "app_name",
                message: "App name cannot be empty".to_string(),
            });
        }

        if self.inbound_capacity == 0 {
            return Err(Error::InvalidSetting {
                setting: "inbound_capacity",
                message: "Inbound queue capacity must be greater than 0".to_string(),
            });
        }

        if self.inbound_capacity > MAX_INBOUND_CAPACITY {
            return Err(Error::InvalidSetting {
                setting: "inbound_capacity",
                message: format!(
                    "Inbound queue capacity exceeds maximum of {}",
                    MAX_INBOUND_CAPACITY
                ),
            });
        }

        if self.network_poll_interval < MIN_NETWORK_POLL_INTERVAL {
            return Err(Error::InvalidSetting {
                setting: "network_poll_interval",
                message: format!(
                    "Poll interval must be at least {} ms",
                    MIN_NETWORK_POLL_INTERVAL.as_millis()
                ),
            });
        }

        if self.listen_overrides.keys().any(|channel| channel.is_empty()) {
            return Err(Error::InvalidSetting {
                setting: "listen_overrides",
                message: "Listen policy override needs a channel name".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Default)]
pub struct BridgeConfigBuilder {
    app_name: Option<String>,
    data_dir: Option<PathBuf>,
    inbound_capacity: Option<usize>,
    default_listen_policy: ListenPolicy,
    listen_overrides: BTreeMap<String, ListenPolicy>,
    preferences_prefix: Option<String>,
    network_poll_interval: Option<Duration>,
    preferences_store: Option<Arc<dyn PreferencesStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    path_provider: Option<Arc<dyn PathProvider>>,
    media_backend: Option<Arc<dyn MediaBackend>>,
    url_launcher: Option<Arc<dyn UrlLauncher>>,
}

impl BridgeConfigBuilder {
    /// Namespace for application-owned directories (default `plugin-bridge`).
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Directory the default preferences database is created in.
    ///
    /// Only used when no `PreferencesStore` is injected and the
    /// `desktop-shims` feature provides one.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = Some(capacity);
        self
    }

    pub fn default_listen_policy(mut self, policy: ListenPolicy) -> Self {
        self.default_listen_policy = policy;
        self
    }

    /// Override the listen policy of one event channel.
    ///
    /// Takes precedence over the policy the plugin declares.
    pub fn listen_policy(mut self, channel: impl Into<String>, policy: ListenPolicy) -> Self {
        self.listen_overrides.insert(channel.into(), policy);
        self
    }

    pub fn preferences_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.preferences_prefix = Some(prefix.into());
        self
    }

    pub fn network_poll_interval(mut self, interval: Duration) -> Self {
        self.network_poll_interval = Some(interval);
        self
    }

    pub fn preferences_store(mut self, store: Arc<dyn PreferencesStore>) -> Self {
        self.preferences_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn path_provider(mut self, provider: Arc<dyn PathProvider>) -> Self {
        self.path_provider = Some(provider);
        self
    }

    pub fn media_backend(mut self, backend: Arc<dyn MediaBackend>) -> Self {
        self.media_backend = Some(backend);
        self
    }

    pub fn url_launcher(mut self, launcher: Arc<dyn UrlLauncher>) -> Self {
        self.url_launcher = Some(launcher);
        self
    }

    /// Builds the final `BridgeConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no `PreferencesStore` is injected
    ///   and `desktop-shims` is disabled
    /// - [`Error::InvalidSetting`] when a tunable is out of range
    /// - [`Error::Internal`] when the default desktop store cannot be opened
    pub fn build(self) -> Result<BridgeConfig> {
        let app_name = self
            .app_name
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());
        let network_poll_interval = self
            .network_poll_interval
            .unwrap_or(DEFAULT_NETWORK_POLL_INTERVAL);

        let preferences_store = match self.preferences_store {
            Some(store) => store,
            None => defaults::preferences_store(&app_name, self.data_dir)?,
        };

        let config = BridgeConfig {
            inbound_capacity: self.inbound_capacity.unwrap_or(DEFAULT_INBOUND_CAPACITY),
            default_listen_policy: self.default_listen_policy,
            listen_overrides: self.listen_overrides,
            preferences_prefix: self.preferences_prefix.unwrap_or_default(),
            network_poll_interval,
            preferences_store,
            network_monitor: self
                .network_monitor
                .or_else(|| defaults::network_monitor(network_poll_interval)),
            path_provider: self
                .path_provider
                .or_else(|| defaults::path_provider(&app_name)),
            media_backend: self.media_backend.or_else(defaults::media_backend),
            url_launcher: self.url_launcher.or_else(defaults::url_launcher),
            app_name,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(feature = "desktop-shims")]
mod defaults {
    use super::*;
    use bridge_desktop::{
        DesktopNetworkMonitor, DesktopPathProvider, SimulatedMediaBackend,
        SqlitePreferencesStore, SystemUrlLauncher,
    };
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    pub(super) fn preferences_store(
        app_name: &str,
        data_dir: Option<PathBuf>,
    ) -> Result<Arc<dyn PreferencesStore>> {
        let dir = data_dir.unwrap_or_else(|| {
            DesktopPathProvider::new(app_name).support_path().to_path_buf()
        });
        let path = dir.join(PREFERENCES_FILE);

        let open = |path: PathBuf| -> Result<SqlitePreferencesStore> {
            let runtime = Runtime::new().map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default PreferencesStore: {}",
                    e
                ))
            })?;

            runtime
                .block_on(SqlitePreferencesStore::new(path))
                .map_err(|e| {
                    Error::Internal(format!("Failed to open default PreferencesStore: {}", e))
                })
        };

        // A runtime cannot be blocked on from inside another one
        let store = match Handle::try_current() {
            Ok(_) => thread::spawn(move || open(path)).join().map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while opening default PreferencesStore".to_string(),
                )
            })??,
            Err(_) => open(path)?,
        };

        Ok(Arc::new(store))
    }

    pub(super) fn network_monitor(poll_interval: Duration) -> Option<Arc<dyn NetworkMonitor>> {
        Some(Arc::new(
            DesktopNetworkMonitor::new().with_poll_interval(poll_interval),
        ))
    }

    pub(super) fn path_provider(app_name: &str) -> Option<Arc<dyn PathProvider>> {
        Some(Arc::new(DesktopPathProvider::new(app_name)))
    }

    pub(super) fn media_backend() -> Option<Arc<dyn MediaBackend>> {
        Some(Arc::new(SimulatedMediaBackend::new()))
    }

    pub(super) fn url_launcher() -> Option<Arc<dyn UrlLauncher>> {
        Some(Arc::new(SystemUrlLauncher::new()))
    }
}

#[cfg(not(feature = "desktop-shims"))]
mod defaults {
    use super::*;

    pub(super) fn preferences_store(
        _app_name: &str,
        _data_dir: Option<PathBuf>,
    ) -> Result<Arc<dyn PreferencesStore>> {
        Err(Error::CapabilityMissing {
            capability: "PreferencesStore".to_string(),
            message: "PreferencesStore implementation is required for shared preferences. \
                     Desktop: enable the 'desktop-shims' feature to use the default SqlitePreferencesStore. \
                     Mobile: inject a store over SharedPreferences/NSUserDefaults."
                .to_string(),
        })
    }

    pub(super) fn network_monitor(_poll_interval: Duration) -> Option<Arc<dyn NetworkMonitor>> {
        None
    }

    pub(super) fn path_provider(_app_name: &str) -> Option<Arc<dyn PathProvider>> {
        None
    }

    pub(super) fn media_backend() -> Option<Arc<dyn MediaBackend>> {
        None
    }

    pub(super) fn url_launcher() -> Option<Arc<dyn UrlLauncher>> {
        None
    }
}
