//! Simulated Media Playback
//!
//! Desktop has no texture-backed decoder in this workspace. The simulated
//! backend keeps a player's transport state (playing, position, looping,
//! volume) against a [`Clock`] and emits the same events a real player
//! would, which is enough to drive the video player plugin end to end.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    media::{MediaBackend, MediaEvent, MediaEventStream, MediaPlayer, MediaSource},
    time::{Clock, SystemClock},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Backend creating [`SimulatedPlayer`]s of a fixed media length and size
pub struct SimulatedMediaBackend {
    clock: Arc<dyn Clock>,
    duration: Duration,
    width: u32,
    height: u32,
}

impl SimulatedMediaBackend {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            duration: Duration::from_secs(60),
            width: 1920,
            height: 1080,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Length of every simulated media item
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

impl Default for SimulatedMediaBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaBackend for SimulatedMediaBackend {
    async fn create_player(&self, source: MediaSource) -> Result<Box<dyn MediaPlayer>> {
        let empty = match &source {
            MediaSource::Uri { uri, .. } => uri.trim().is_empty(),
            MediaSource::Asset { key } => key.trim().is_empty(),
        };
        if empty {
            return Err(BridgeError::OperationFailed(
                "Media source is empty".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(MediaEvent::Initialized {
            duration: self.duration,
            width: self.width,
            height: self.height,
        });
        let _ = tx.send(MediaEvent::BufferingUpdate {
            ranges: vec![(0, self.duration.as_millis() as u64)],
        });

        debug!(source = ?source, "Simulated player created");
        Ok(Box::new(SimulatedPlayer {
            inner: Arc::new(PlayerInner {
                clock: self.clock.clone(),
                duration: self.duration,
                state: Mutex::new(Transport {
                    volume: 1.0,
                    ..Transport::default()
                }),
                events: Mutex::new(Some(tx)),
                disposed: AtomicBool::new(false),
            }),
            receiver: Mutex::new(Some(rx)),
        }))
    }
}

#[derive(Debug, Default)]
struct Transport {
    playing: bool,
    looping: bool,
    volume: f64,
    // Position at `anchor_millis`
    anchor_position: Duration,
    anchor_millis: i64,
    // Bumped on every transport change; stale end-of-media timers compare it
    epoch: u64,
}

struct PlayerInner {
    clock: Arc<dyn Clock>,
    duration: Duration,
    state: Mutex<Transport>,
    events: Mutex<Option<mpsc::UnboundedSender<MediaEvent>>>,
    disposed: AtomicBool,
}

impl PlayerInner {
    fn state(&self) -> std::sync::MutexGuard<'_, Transport> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(BridgeError::NotAvailable("Player disposed".to_string()))
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: MediaEvent) {
        if let Some(tx) = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(event);
        }
    }

    fn position_of(&self, transport: &Transport) -> Duration {
        if !transport.playing {
            return transport.anchor_position;
        }

        let elapsed = self.clock.unix_timestamp_millis() - transport.anchor_millis;
        let position = transport.anchor_position + Duration::from_millis(elapsed.max(0) as u64);

        if transport.looping && !self.duration.is_zero() {
            let millis = position.as_millis() % self.duration.as_millis();
            Duration::from_millis(millis as u64)
        } else {
            position.min(self.duration)
        }
    }

    /// Re-anchor the transport at the current position.
    fn reanchor(&self, transport: &mut Transport) {
        transport.anchor_position = self.position_of(transport);
        transport.anchor_millis = self.clock.unix_timestamp_millis();
        transport.epoch += 1;
    }

    fn schedule_completion(self: &Arc<Self>, transport: &Transport) {
        if !transport.playing || transport.looping {
            return;
        }

        let remaining = self.duration.saturating_sub(transport.anchor_position);
        let epoch = transport.epoch;
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let completed = {
                let mut transport = inner.state();
                if transport.epoch == epoch && transport.playing {
                    inner.reanchor(&mut transport);
                    transport.playing = false;
                    true
                } else {
                    false
                }
            };
            if completed && !inner.disposed.load(Ordering::Acquire) {
                inner.emit(MediaEvent::Completed);
            }
        });
    }
}

/// A clock-driven player with no decoding
pub struct SimulatedPlayer {
    inner: Arc<PlayerInner>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<MediaEvent>>>,
}

impl SimulatedPlayer {
    pub fn is_playing(&self) -> bool {
        self.inner.state().playing
    }

    pub fn volume(&self) -> f64 {
        self.inner.state().volume
    }
}

#[async_trait]
impl MediaPlayer for SimulatedPlayer {
    async fn play(&self) -> Result<()> {
        self.inner.ensure_live()?;
        let mut transport = self.inner.state();
        if transport.playing {
            return Ok(());
        }
        self.inner.reanchor(&mut transport);
        if transport.anchor_position >= self.inner.duration {
            transport.anchor_position = Duration::ZERO;
        }
        transport.playing = true;
        self.inner.schedule_completion(&transport);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.inner.ensure_live()?;
        let mut transport = self.inner.state();
        self.inner.reanchor(&mut transport);
        transport.playing = false;
        Ok(())
    }

    async fn seek_to(&self, position: Duration) -> Result<()> {
        self.inner.ensure_live()?;
        let mut transport = self.inner.state();
        self.inner.reanchor(&mut transport);
        transport.anchor_position = position.min(self.inner.duration);
        self.inner.schedule_completion(&transport);
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.inner.ensure_live()?;
        self.inner.state().volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    async fn set_looping(&self, looping: bool) -> Result<()> {
        self.inner.ensure_live()?;
        let mut transport = self.inner.state();
        self.inner.reanchor(&mut transport);
        transport.looping = looping;
        self.inner.schedule_completion(&transport);
        Ok(())
    }

    async fn position(&self) -> Result<Duration> {
        self.inner.ensure_live()?;
        let transport = self.inner.state();
        Ok(self.inner.position_of(&transport))
    }

    fn take_events(&self) -> Option<Box<dyn MediaEventStream>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| Box::new(SimulatedEventStream { rx }) as Box<dyn MediaEventStream>)
    }

    fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.state().playing = false;
        // Dropping the sender ends the event stream
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("Simulated player disposed");
    }
}

struct SimulatedEventStream {
    rx: mpsc::UnboundedReceiver<MediaEvent>,
}

#[async_trait]
impl MediaEventStream for SimulatedEventStream {
    async fn next(&mut self) -> Option<MediaEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(uri: &str) -> MediaSource {
        MediaSource::Uri {
            uri: uri.to_string(),
            format_hint: None,
        }
    }

    #[tokio::test]
    async fn test_initialized_event_first() {
        let backend = SimulatedMediaBackend::new()
            .with_duration(Duration::from_secs(10))
            .with_size(640, 480);
        let player = backend.create_player(uri("file:///a.mp4")).await.unwrap();

        let mut events = player.take_events().unwrap();
        assert!(player.take_events().is_none());
        assert_eq!(
            events.next().await,
            Some(MediaEvent::Initialized {
                duration: Duration::from_secs(10),
                width: 640,
                height: 480,
            })
        );
    }

    #[tokio::test]
    async fn test_empty_source_rejected() {
        let backend = SimulatedMediaBackend::new();
        assert!(backend.create_player(uri("  ")).await.is_err());
    }

    #[tokio::test]
    async fn test_seek_and_pause_hold_position() {
        let backend = SimulatedMediaBackend::new();
        let player = backend
            .create_player(MediaSource::Asset {
                key: "assets/clip.mp4".into(),
            })
            .await
            .unwrap();

        player.seek_to(Duration::from_secs(5)).await.unwrap();
        assert_eq!(player.position().await.unwrap(), Duration::from_secs(5));

        player.seek_to(Duration::from_secs(600)).await.unwrap();
        assert_eq!(player.position().await.unwrap(), Duration::from_secs(60));

        player.set_volume(3.0).await.unwrap();
        player.pause().await.unwrap();
        assert_eq!(player.position().await.unwrap(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_completion_emitted_when_not_looping() {
        let backend = SimulatedMediaBackend::new().with_duration(Duration::from_millis(20));
        let player = backend.create_player(uri("https://x/y.mp4")).await.unwrap();
        let mut events = player.take_events().unwrap();

        player.play().await.unwrap();
        let mut completed = false;
        while let Some(event) = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
        {
            if event == MediaEvent::Completed {
                completed = true;
                break;
            }
        }
        assert!(completed);
    }

    #[tokio::test]
    async fn test_dispose_closes_stream_and_rejects_calls() {
        let backend = SimulatedMediaBackend::new();
        let player = backend.create_player(uri("file:///a.mp4")).await.unwrap();
        let mut events = player.take_events().unwrap();

        player.dispose();
        player.dispose();

        // Buffered events drain, then the stream ends
        assert!(events.next().await.is_some());
        assert!(events.next().await.is_some());
        assert_eq!(events.next().await, None);
        assert!(player.play().await.is_err());
    }
}
