//! Workspace umbrella crate.
//!
//! Exposes feature flags that map to the individual workspace crates so a
//! host application can depend on `plugin-bridge-workspace` alone:
//!
//! - `desktop-shims` (default): [`core_service`] with the desktop capability
//!   implementations
//! - `plugins`: [`core_plugins`] without the service façade

#[cfg(feature = "desktop-shims")]
pub use core_service;

#[cfg(feature = "plugins")]
pub use core_plugins;
