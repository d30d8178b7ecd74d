//! # Video Player
//!
//! Native players addressed by texture id.
//!
//! `create` asks the host [`MediaBackend`] for a player, stores it in the
//! plugin's [`HandleRegistry`] and answers `{"textureId": id}`. Every other
//! player method takes that `textureId`. Each player gets its own event
//! channel, `flutter.io/videoPlayer/videoEvents<textureId>`; events the player
//! reports before the application listens are buffered in a
//! [`QueuingEventSink`] and delivered on `listen`.
//!
//! The texture registry belongs to the foreground activity, so every call
//! fails with `no_activity` while none is attached.

use async_trait::async_trait;
use bridge_traits::{MediaBackend, MediaEvent, MediaEventStream, MediaPlayer, MediaSource};
use core_channel::{
    EventSink, Handle, HandleRegistry, MethodCall, MethodRouter, Messenger, NativeResource, Plugin,
    PluginError, QueuingEventSink, Result as ChannelResult, StreamHandler, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const CHANNEL: &str = "flutter.io/videoPlayer";

/// Prefix of the per-player event channel; the texture id is appended
pub const EVENTS_CHANNEL_PREFIX: &str = "flutter.io/videoPlayer/videoEvents";

/// No foreground activity to host textures
pub const NO_ACTIVITY: &str = "no_activity";

/// Error event code for player failures
pub const VIDEO_ERROR: &str = "VideoError";

/// Name of the texture id argument, also used in unknown-handle errors
const TEXTURE_ID: &str = "textureId";

pub fn events_channel(texture_id: Handle) -> String {
    format!("{}{}", EVENTS_CHANNEL_PREFIX, texture_id)
}

/// A live player and the plumbing around it
pub struct PlayerEntry {
    player: Box<dyn MediaPlayer>,
    events: Arc<QueuingEventSink>,
    channel: String,
    pump: Option<JoinHandle<()>>,
}

impl PlayerEntry {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn events(&self) -> &Arc<QueuingEventSink> {
        &self.events
    }
}

impl NativeResource for PlayerEntry {
    fn dispose(&self) {
        if let Some(pump) = &self.pump {
            pump.abort();
        }
        self.player.dispose();
    }
}

/// Translate a player event onto the event channel.
fn forward(events: &QueuingEventSink, event: MediaEvent) {
    match event {
        MediaEvent::Initialized {
            duration,
            width,
            height,
        } => events.success(event_map(
            "initialized",
            vec![
                ("duration", millis(duration).into()),
                ("width", width.into()),
                ("height", height.into()),
            ],
        )),
        MediaEvent::Completed => events.success(event_map("completed", vec![])),
        MediaEvent::BufferingUpdate { ranges } => {
            let values: Vec<Value> = ranges
                .into_iter()
                .map(|(start, end)| Value::List(vec![to_int(start), to_int(end)]))
                .collect();
            events.success(event_map("bufferingUpdate", vec![("values", values.into())]))
        }
        MediaEvent::BufferingStart => events.success(event_map("bufferingStart", vec![])),
        MediaEvent::BufferingEnd => events.success(event_map("bufferingEnd", vec![])),
        MediaEvent::Error { message } => events.error(
            VIDEO_ERROR,
            format!("Video player had error {}", message),
            (),
        ),
    }
}

fn event_map(name: &str, fields: Vec<(&str, Value)>) -> Value {
    std::iter::once(("event", Value::from(name)))
        .chain(fields)
        .collect()
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn to_int(n: u64) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn spawn_pump(mut stream: Box<dyn MediaEventStream>, events: Arc<QueuingEventSink>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            forward(&events, event);
        }
        debug!("Player event stream closed");
    })
}

/// Connects a player's event channel to its queue
struct PlayerEvents {
    events: Arc<QueuingEventSink>,
}

#[async_trait]
impl StreamHandler for PlayerEvents {
    async fn on_listen(&self, _arguments: Value, sink: EventSink) -> Result<(), PluginError> {
        self.events.set_delegate(Some(sink));
        Ok(())
    }

    async fn on_cancel(&self, _arguments: Value) {
        self.events.set_delegate(None);
    }
}

pub struct VideoState {
    backend: Arc<dyn MediaBackend>,
    players: HandleRegistry<PlayerEntry>,
    messenger: Mutex<Option<Messenger>>,
    activity: AtomicBool,
}

impl VideoState {
    fn messenger(&self) -> Option<Messenger> {
        self.messenger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_messenger(&self, messenger: Option<Messenger>) {
        *self.messenger.lock().unwrap_or_else(PoisonError::into_inner) = messenger;
    }

    fn ensure_activity(&self) -> Result<Messenger, PluginError> {
        match self.messenger() {
            Some(messenger) if self.activity.load(Ordering::Acquire) => Ok(messenger),
            _ => Err(PluginError::new(
                NO_ACTIVITY,
                "video_player plugin requires a foreground activity",
            )),
        }
    }

    async fn player(&self, call: &MethodCall) -> Result<Arc<PlayerEntry>, PluginError> {
        self.ensure_activity()?;
        let texture_id: Handle = call.required(TEXTURE_ID)?;
        self.players
            .get(texture_id)
            .await
            .map_err(|_| unknown_texture(texture_id))
    }

    async fn dispose_player(&self, texture_id: Handle) -> Result<(), PluginError> {
        let entry = self
            .players
            .get(texture_id)
            .await
            .map_err(|_| unknown_texture(texture_id))?;
        self.players
            .dispose(texture_id)
            .await
            .map_err(|_| unknown_texture(texture_id))?;
        if let Some(messenger) = self.messenger() {
            messenger.remove_channel(entry.channel()).await;
        }
        Ok(())
    }
}

fn unknown_texture(texture_id: Handle) -> PluginError {
    PluginError::new(
        format!("Unknown {}", TEXTURE_ID),
        format!("No video player associated with texture id {}", texture_id),
    )
}

/// The video player plugin
pub struct VideoPlayerPlugin {
    state: Arc<VideoState>,
}

impl VideoPlayerPlugin {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            state: Arc::new(VideoState {
                backend,
                players: HandleRegistry::new(TEXTURE_ID),
                messenger: Mutex::new(None),
                activity: AtomicBool::new(false),
            }),
        }
    }

    /// Live players
    pub fn players(&self) -> &HandleRegistry<PlayerEntry> {
        &self.state.players
    }

    pub fn router(&self) -> MethodRouter<VideoState> {
        MethodRouter::builder(self.state.clone())
            .route("init", init)
            .route("create", create)
            .route("setLooping", set_looping)
            .route("setVolume", set_volume)
            .route("play", play)
            .route("pause", pause)
            .route("seekTo", seek_to)
            .route("position", position)
            .route("dispose", dispose)
            .build()
    }
}

#[async_trait]
impl Plugin for VideoPlayerPlugin {
    fn name(&self) -> &str {
        "video_player"
    }

    async fn on_attached(&self, messenger: &Messenger) -> ChannelResult<()> {
        messenger
            .set_method_call_handler(CHANNEL, Arc::new(self.router()))
            .await?;
        self.state.set_messenger(Some(messenger.clone()));
        Ok(())
    }

    async fn on_detached(&self) {
        let disposed = self.state.players.dispose_all().await;
        self.state.set_messenger(None);
        info!(disposed, "Video players released");
    }

    async fn on_activity_attached(&self) {
        self.state.activity.store(true, Ordering::Release);
    }

    async fn on_activity_detached(&self) {
        self.state.activity.store(false, Ordering::Release);
    }
}

async fn init(state: Arc<VideoState>, _call: MethodCall) -> Result<Value, PluginError> {
    state.ensure_activity()?;
    for texture_id in state.players.handles().await {
        // A concurrent dispose may have won; either way it is gone
        let _ = state.dispose_player(texture_id).await;
    }
    debug!("Video players reset");
    Ok(Value::Null)
}

async fn create(state: Arc<VideoState>, call: MethodCall) -> Result<Value, PluginError> {
    let messenger = state.ensure_activity()?;

    let source = match call.argument::<String>("asset")? {
        Some(asset) => {
            let key = match call.argument::<String>("package")? {
                Some(package) => format!("packages/{}/{}", package, asset),
                None => asset,
            };
            MediaSource::Asset { key }
        }
        None => MediaSource::Uri {
            uri: call.required("uri")?,
            format_hint: call.argument("formatHint")?,
        },
    };

    let player = state.backend.create_player(source).await?;
    let events = Arc::new(QueuingEventSink::new());
    let stream = player.take_events();

    let texture_id = state
        .players
        .insert_with(|texture_id| PlayerEntry {
            pump: stream.map(|stream| spawn_pump(stream, events.clone())),
            player,
            events: events.clone(),
            channel: events_channel(texture_id),
        })
        .await;

    let channel = events_channel(texture_id);
    if let Err(err) = messenger
        .set_stream_handler(channel.as_str(), Arc::new(PlayerEvents { events }))
        .await
    {
        warn!(texture_id = %texture_id, error = %err, "Event channel registration failed");
        let _ = state.players.dispose(texture_id).await;
        return Err(err.into());
    }

    debug!(texture_id = %texture_id, channel = %channel, "Video player created");
    Ok([(TEXTURE_ID, Value::from(texture_id))].into_iter().collect())
}

async fn set_looping(state: Arc<VideoState>, call: MethodCall) -> Result<Value, PluginError> {
    let entry = state.player(&call).await?;
    entry.player.set_looping(call.required("looping")?).await?;
    Ok(Value::Null)
}

async fn set_volume(state: Arc<VideoState>, call: MethodCall) -> Result<Value, PluginError> {
    let entry = state.player(&call).await?;
    entry.player.set_volume(call.required("volume")?).await?;
    Ok(Value::Null)
}

async fn play(state: Arc<VideoState>, call: MethodCall) -> Result<Value, PluginError> {
    state.player(&call).await?.player.play().await?;
    Ok(Value::Null)
}

async fn pause(state: Arc<VideoState>, call: MethodCall) -> Result<Value, PluginError> {
    state.player(&call).await?.player.pause().await?;
    Ok(Value::Null)
}

async fn seek_to(state: Arc<VideoState>, call: MethodCall) -> Result<Value, PluginError> {
    let entry = state.player(&call).await?;
    let location: i64 = call.required("location")?;
    let location = Duration::from_millis(location.max(0) as u64);
    entry.player.seek_to(location).await?;
    Ok(Value::Null)
}

async fn position(state: Arc<VideoState>, call: MethodCall) -> Result<i64, PluginError> {
    let entry = state.player(&call).await?;
    Ok(millis(entry.player.position().await?))
}

async fn dispose(state: Arc<VideoState>, call: MethodCall) -> Result<Value, PluginError> {
    state.ensure_activity()?;
    let texture_id: Handle = call.required(TEXTURE_ID)?;
    state.dispose_player(texture_id).await?;
    debug!(texture_id = %texture_id, "Video player disposed");
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_translation() {
        let events = QueuingEventSink::new();
        forward(
            &events,
            MediaEvent::Initialized {
                duration: Duration::from_secs(2),
                width: 4,
                height: 3,
            },
        );
        forward(&events, MediaEvent::BufferingUpdate { ranges: vec![(0, 500)] });
        forward(&events, MediaEvent::Error { message: "decoder".into() });
        // Terminal error closes the queue
        forward(&events, MediaEvent::Completed);
        assert_eq!(events.pending(), 3);
    }

    #[test]
    fn test_event_map_shape() {
        let value = event_map("initialized", vec![("duration", Value::Int(2000))]);
        assert_eq!(value.get("event"), Some(&Value::from("initialized")));
        assert_eq!(value.get("duration"), Some(&Value::Int(2000)));
    }

    #[test]
    fn test_unknown_texture_error() {
        let err = unknown_texture(Handle(9));
        assert_eq!(err.code, "Unknown textureId");
        assert_eq!(
            err.message.as_deref(),
            Some("No video player associated with texture id 9")
        );
    }
}
