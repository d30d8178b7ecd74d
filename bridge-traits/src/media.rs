//! Media Playback Abstraction
//!
//! Native players backing the video player plugin. A player renders into a
//! texture owned by the host; the plugin only sees the control surface and
//! the player's event stream.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Where a player loads its media from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Network or file URI
    Uri {
        uri: String,
        /// Container hint (`ss`, `hls`, `dash`, `other`)
        format_hint: Option<String>,
    },
    /// Bundled application asset, already resolved to a lookup key
    Asset { key: String },
}

/// Events a native player reports over its lifetime
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Media is ready; carries the natural size and duration
    Initialized {
        duration: Duration,
        width: u32,
        height: u32,
    },
    /// Playback reached the end of the media (not emitted while looping)
    Completed,
    /// Buffered ranges, in milliseconds
    BufferingUpdate { ranges: Vec<(u64, u64)> },
    BufferingStart,
    BufferingEnd,
    /// Unrecoverable player failure
    Error { message: String },
}

/// A single native player instance
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn seek_to(&self, position: Duration) -> Result<()>;

    /// Volume in `0.0..=1.0`; implementations clamp
    async fn set_volume(&self, volume: f64) -> Result<()>;

    async fn set_looping(&self, looping: bool) -> Result<()>;

    async fn position(&self) -> Result<Duration>;

    /// Take the player's event stream
    ///
    /// Only the first call returns `Some`.
    fn take_events(&self) -> Option<Box<dyn MediaEventStream>>;

    /// Release decoder and texture resources
    ///
    /// Must be idempotent; the event stream closes afterwards.
    fn dispose(&self);
}

/// Stream of player events
#[async_trait]
pub trait MediaEventStream: Send {
    /// Returns `None` once the player is disposed.
    async fn next(&mut self) -> Option<MediaEvent>;
}

/// Factory for native players
///
/// # Platform Support
///
/// - **Android**: ExoPlayer with a SurfaceTexture entry
/// - **iOS**: AVPlayer with a CVPixelBuffer texture
/// - **Desktop**: simulated player (no decoding)
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Create a player for the given source
    async fn create_player(&self, source: MediaSource) -> Result<Box<dyn MediaPlayer>>;
}
