//! # Core Plugins
//!
//! First-party plugins built on [`core_channel`]. Each plugin is a thin
//! adapter: it decodes arguments, calls one host capability from
//! [`bridge_traits`], and encodes the outcome.
//!
//! | Plugin | Channel | Host capability |
//! |--------|---------|-----------------|
//! | [`SharedPreferencesPlugin`] | `plugins.flutter.io/shared_preferences` | `PreferencesStore` |
//! | [`CallbackDispatcherPlugin`] | `plugins.flutter.io/callback_dispatcher` | [`CallbackRegistry`] |
//! | [`ConnectivityPlugin`] | `plugins.flutter.io/connectivity` (+ `_status` events) | `NetworkMonitor` |
//! | [`VideoPlayerPlugin`] | `flutter.io/videoPlayer` (+ per-player events) | `MediaBackend` |
//! | [`UrlLauncherPlugin`] | `plugins.flutter.io/url_launcher` | `UrlLauncher` |
//! | [`PathProviderPlugin`] | `plugins.flutter.io/path_provider` | `PathProvider` |
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (host, outbound) = PluginHost::new(ListenPolicies::default());
//! host.attach(vec![
//!     Arc::new(SharedPreferencesPlugin::new(store)) as Arc<dyn Plugin>,
//!     Arc::new(ConnectivityPlugin::new(monitor)),
//! ])
//! .await?;
//! ```

pub mod callback_dispatcher;
pub mod connectivity;
pub mod path_provider;
pub mod shared_preferences;
pub mod url_launcher;
pub mod video_player;

pub use callback_dispatcher::{CallbackDispatcherPlugin, CallbackRegistry};
pub use connectivity::ConnectivityPlugin;
pub use path_provider::PathProviderPlugin;
pub use shared_preferences::SharedPreferencesPlugin;
pub use url_launcher::UrlLauncherPlugin;
pub use video_player::{PlayerEntry, VideoPlayerPlugin};
