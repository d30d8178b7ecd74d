//! Video player lifecycle through a running host

mod common;

use std::sync::Arc;
use std::time::Duration;

use bridge_desktop::SimulatedMediaBackend;
use common::{args, Harness};
use core_channel::{Handle, Plugin, Response, StreamEnvelope, Value};
use core_plugins::video_player::{self, CHANNEL, NO_ACTIVITY};
use core_plugins::VideoPlayerPlugin;

const WAIT: Duration = Duration::from_secs(2);

fn plugin() -> Arc<VideoPlayerPlugin> {
    let backend = SimulatedMediaBackend::new()
        .with_duration(Duration::from_secs(10))
        .with_size(640, 480);
    Arc::new(VideoPlayerPlugin::new(Arc::new(backend)))
}

fn texture(id: i64) -> Value {
    args(vec![("textureId", Value::Int(id))])
}

fn uri() -> Value {
    args(vec![("uri", "https://example.com/clip.mp4".into())])
}

async fn create(harness: &mut Harness) -> i64 {
    match harness.call(CHANNEL, "create", uri()).await {
        Response::Success(reply) => reply
            .get("textureId")
            .and_then(Value::as_i64)
            .expect("textureId in reply"),
        other => panic!("unexpected response {other:?}"),
    }
}

#[tokio::test]
async fn test_calls_without_activity_fail() {
    let plugin = plugin();
    let mut harness = Harness::new(vec![plugin.clone() as Arc<dyn Plugin>]).await;

    let response = harness.call(CHANNEL, "create", uri()).await;
    assert_eq!(response.error_code(), Some(NO_ACTIVITY));
    assert!(plugin.players().is_empty().await);

    let response = harness.call(CHANNEL, "play", texture(1)).await;
    assert_eq!(response.error_code(), Some(NO_ACTIVITY));
}

#[tokio::test]
async fn test_create_listen_and_control() {
    let plugin = plugin();
    let mut harness = Harness::new(vec![plugin.clone() as Arc<dyn Plugin>]).await;
    harness.host.attach_activity().await;

    let id = create(&mut harness).await;
    assert_eq!(id, 1);
    let events = video_player::events_channel(Handle(id));
    assert_eq!(events, "flutter.io/videoPlayer/videoEvents1");

    // Events reported before listen are delivered once the app listens
    assert!(harness.call(&events, "listen", Value::Null).await.is_success());
    match harness.next_event(&events, WAIT).await {
        Some(StreamEnvelope::Event(event)) => {
            assert_eq!(event.get("event"), Some(&Value::from("initialized")));
            assert_eq!(event.get("duration"), Some(&Value::Int(10_000)));
            assert_eq!(event.get("width"), Some(&Value::Int(640)));
            assert_eq!(event.get("height"), Some(&Value::Int(480)));
        }
        other => panic!("unexpected event {other:?}"),
    }
    match harness.next_event(&events, WAIT).await {
        Some(StreamEnvelope::Event(event)) => {
            assert_eq!(event.get("event"), Some(&Value::from("bufferingUpdate")));
        }
        other => panic!("unexpected event {other:?}"),
    }

    for (method, extra) in [
        ("setLooping", ("looping", Value::Bool(true))),
        ("setVolume", ("volume", Value::Float(0.5))),
        ("seekTo", ("location", Value::Int(2_500))),
    ] {
        let arguments = args(vec![("textureId", Value::Int(id)), extra]);
        assert_eq!(
            harness.call(CHANNEL, method, arguments).await,
            Response::Success(Value::Null),
            "{method}"
        );
    }

    assert_eq!(
        harness.call(CHANNEL, "position", texture(id)).await,
        Response::Success(Value::Int(2_500))
    );
    assert_eq!(
        harness.call(CHANNEL, "play", texture(id)).await,
        Response::Success(Value::Null)
    );
    assert_eq!(
        harness.call(CHANNEL, "pause", texture(id)).await,
        Response::Success(Value::Null)
    );
}

#[tokio::test]
async fn test_unknown_texture_id_is_reported() {
    let plugin = plugin();
    let mut harness = Harness::new(vec![plugin as Arc<dyn Plugin>]).await;
    harness.host.attach_activity().await;

    match harness.call(CHANNEL, "play", texture(5)).await {
        Response::Error(err) => {
            assert_eq!(err.code, "Unknown textureId");
            assert_eq!(
                err.message.as_deref(),
                Some("No video player associated with texture id 5")
            );
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[tokio::test]
async fn test_dispose_releases_player_and_channel() {
    let plugin = plugin();
    let mut harness = Harness::new(vec![plugin.clone() as Arc<dyn Plugin>]).await;
    harness.host.attach_activity().await;

    let id = create(&mut harness).await;
    let events = video_player::events_channel(Handle(id));
    assert!(harness.host.messenger().contains(&events).await);

    assert_eq!(
        harness.call(CHANNEL, "dispose", texture(id)).await,
        Response::Success(Value::Null)
    );
    assert!(plugin.players().is_empty().await);
    assert!(!harness.host.messenger().contains(&events).await);

    // A disposed handle is unknown from then on
    let response = harness.call(CHANNEL, "dispose", texture(id)).await;
    assert_eq!(response.error_code(), Some("Unknown textureId"));
    let response = harness.call(CHANNEL, "position", texture(id)).await;
    assert_eq!(response.error_code(), Some("Unknown textureId"));

    // Handles are never reused
    assert_eq!(create(&mut harness).await, id + 1);
}

#[tokio::test]
async fn test_init_and_detach_sweep_every_player() {
    let plugin = plugin();
    let mut harness = Harness::new(vec![plugin.clone() as Arc<dyn Plugin>]).await;
    harness.host.attach_activity().await;

    for _ in 0..3 {
        create(&mut harness).await;
    }
    assert_eq!(plugin.players().len().await, 3);

    assert_eq!(
        harness.call(CHANNEL, "init", Value::Null).await,
        Response::Success(Value::Null)
    );
    assert!(plugin.players().is_empty().await);

    for _ in 0..2 {
        create(&mut harness).await;
    }
    harness.host.detach().await;
    assert!(plugin.players().is_empty().await);

    // Detaching again finds nothing left to release
    harness.host.detach().await;
    assert!(plugin.players().is_empty().await);
}
