//! Host harness shared by the plugin integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use core_channel::{
    InboundMessage, ListenPolicies, MethodCall, OutboundMessage, Plugin, PluginHost, Response,
    StreamEnvelope, Value,
};

pub struct Harness {
    pub host: PluginHost,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    streams: Vec<(String, StreamEnvelope)>,
    next_reply: u64,
}

impl Harness {
    pub async fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let (host, outbound) = PluginHost::new(ListenPolicies::default());
        host.attach(plugins).await.unwrap();
        Self {
            host,
            outbound,
            streams: Vec::new(),
            next_reply: 0,
        }
    }

    /// Send one call and wait for its reply, keeping stream writes seen on
    /// the way.
    pub async fn call(&mut self, channel: &str, method: &str, arguments: Value) -> Response {
        self.next_reply += 1;
        let reply_id = self.next_reply;
        self.host
            .handle_message(InboundMessage::new(
                channel,
                reply_id,
                MethodCall::new(method, arguments),
            ))
            .await;

        loop {
            match self.outbound.recv().await.unwrap() {
                OutboundMessage::Reply {
                    reply_id: id,
                    response,
                } if id == reply_id => return response,
                OutboundMessage::Stream { channel, envelope } => {
                    self.streams.push((channel, envelope))
                }
                OutboundMessage::Reply { .. } => continue,
            }
        }
    }

    /// Wait up to `timeout` for the next write on `channel`.
    pub async fn next_event(&mut self, channel: &str, timeout: Duration) -> Option<StreamEnvelope> {
        if let Some(index) = self.streams.iter().position(|(name, _)| name == channel) {
            return Some(self.streams.remove(index).1);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let message = tokio::time::timeout_at(deadline, self.outbound.recv())
                .await
                .ok()??;
            if let OutboundMessage::Stream {
                channel: name,
                envelope,
            } = message
            {
                if name == channel {
                    return Some(envelope);
                }
                self.streams.push((name, envelope));
            }
        }
    }

    /// Stream writes on `channel` received so far, including queued ones.
    pub fn take_events(&mut self, channel: &str) -> Vec<StreamEnvelope> {
        while let Ok(message) = self.outbound.try_recv() {
            if let OutboundMessage::Stream { channel, envelope } = message {
                self.streams.push((channel, envelope));
            }
        }
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.streams)
            .into_iter()
            .partition(|(name, _)| name == channel);
        self.streams = rest;
        matching.into_iter().map(|(_, envelope)| envelope).collect()
    }
}

pub fn args(pairs: Vec<(&str, Value)>) -> Value {
    pairs.into_iter().collect()
}
