//! Run the bridge on the desktop capabilities and print every outbound
//! message as the JSON the application layer would receive.
//!
//! ```bash
//! cargo run -p core-service --example desktop_host
//! ```

use anyhow::Context;
use bridge_traits::LogLevel;
use core_channel::{JsonMethodCodec, MethodCall, OutboundMessage, Value};
use core_plugins::{connectivity, path_provider, shared_preferences};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::bootstrap_desktop;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let (service, mut outbound) = bootstrap_desktop("plugin-bridge-demo")
        .await
        .context("bootstrapping desktop bridge")?;
    service.attach_activity().await;

    let calls = [
        (
            shared_preferences::CHANNEL,
            MethodCall::new(
                "setString",
                [("key", Value::from("flutter.greeting")), ("value", "hello".into())]
                    .into_iter()
                    .collect::<Value>(),
            ),
        ),
        (shared_preferences::CHANNEL, MethodCall::new("getAll", Value::Null)),
        (path_provider::CHANNEL, MethodCall::new("getTemporaryDirectory", Value::Null)),
        (connectivity::CHANNEL, MethodCall::new("check", Value::Null)),
        (connectivity::STATUS_CHANNEL, MethodCall::new("listen", Value::Null)),
    ];
    for (reply_id, (channel, call)) in (1..).zip(calls) {
        service.call(channel, reply_id, call).await?;
    }

    let codec = JsonMethodCodec;
    let deadline = tokio::time::sleep(Duration::from_secs(3));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            message = outbound.recv() => {
                let Some(message) = message else { break };
                let payload = message.encode(&codec)?;
                let label = match &message {
                    OutboundMessage::Reply { reply_id, .. } => format!("reply {reply_id}"),
                    OutboundMessage::Stream { channel, .. } => format!("event {channel}"),
                };
                println!("{label}: {}", String::from_utf8_lossy(&payload));
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
