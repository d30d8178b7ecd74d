//! # Core Runtime Module
//!
//! Ambient runtime infrastructure for the plugin bridge:
//! - Logging and tracing setup with host log forwarding
//! - Bridge configuration with fail-fast capability validation
//!
//! ## Overview
//!
//! Nothing in here routes calls. The channel layer lives in `core-channel`
//! and the plugins in `core-plugins`; this crate decides how they log and
//! which host capabilities and tunables they are built with.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use error::{Error, Result};
