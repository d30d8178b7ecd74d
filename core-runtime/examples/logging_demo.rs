//! Logging setup demonstration
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format, mirrored to a Logcat-style console sink
//! cargo run --example logging_demo -- json sink
//!
//! # Compact format
//! cargo run --example logging_demo -- compact
//! ```

use bridge_traits::{ConsoleLogger, LogLevel};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, info_span, instrument, trace, warn, Instrument};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some(_) => LogFormat::Pretty,
        None => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_filter("logging_demo=trace,core_runtime=trace");

    if args.get(2).map(String::as_str) == Some("sink") {
        config = config.with_logger_sink(Arc::new(ConsoleLogger {
            min_level: LogLevel::Debug,
        }));
    }

    if let Err(err) = init_logging(config) {
        eprintln!("{}", err);
        return;
    }

    info!(format = ?format, "Logging initialized");

    demo_call().await;
    demo_stream().await;
    demo_redaction();

    info!("Demo complete");
}

#[instrument(fields(channel = "plugins.flutter.io/shared_preferences", method = "setString", reply_id = 1))]
async fn demo_call() {
    debug!("Decoded call");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    info!("Reply sent");
}

async fn demo_stream() {
    let channel = "plugins.flutter.io/connectivity_status";
    async {
        info!("Listening");
        for status in ["wifi", "none", "wifi"] {
            trace!(status, "Event forwarded");
        }
        warn!("Listen replaced an active subscription");
    }
    .instrument(info_span!("stream", channel))
    .await;
}

fn demo_redaction() {
    let path = "/home/user/.local/share/plugin-bridge/shared_preferences.db";
    info!(
        authorization = %redact_if_sensitive("authorization", "Bearer abc123"),
        email = %redact_if_sensitive("email", "user@example.com"),
        path = %strip_path(path),
        "Launching with headers"
    );
}
