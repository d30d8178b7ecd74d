//! # Core Channel
//!
//! The native half of the plugin bridge: receives method calls from the
//! application layer, routes them to handlers, and sends exactly one outcome
//! back. Event channels push zero or more events until cancelled.
//!
//! ## Components
//!
//! - [`value`] / [`call`] - Untyped values and typed argument access
//! - [`codec`] - Wire encoding ([`JsonMethodCodec`])
//! - [`router`] - Method-name dispatch with panic containment
//! - [`result`] - Write-once result sink
//! - [`event`] - Event channel state machine and sinks
//! - [`handles`] - Handle registry for native resources
//! - [`messenger`] / [`plugin`] - Channel registry, outbound queue, host lifecycle
//!
//! ## Threading
//!
//! Every reply and stream write goes through one FIFO outbound queue. The
//! receiver is drained by the designated callback thread, so handlers can
//! complete results from any task without marshaling themselves.

pub mod call;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod event;
pub mod handles;
pub mod messenger;
pub mod plugin;
pub mod result;
pub mod router;
pub mod value;

pub use call::{ArgumentError, MethodCall};
pub use codec::{CodecError, JsonMethodCodec, MethodCodec};
pub use envelope::{codes, PluginError, Response, StreamEnvelope};
pub use error::{ChannelError, Result};
pub use event::{EventChannel, EventSink, ListenPolicies, ListenPolicy, QueuingEventSink, StreamHandler};
pub use handles::{Handle, HandleRegistry, NativeResource};
pub use messenger::{InboundMessage, MethodCallHandler, Messenger, OutboundMessage, Outbox, ReplyId};
pub use plugin::{Plugin, PluginHost};
pub use result::{MethodResult, SharedMethodResult};
pub use router::{MethodRouter, MethodRouterBuilder};
pub use value::{FromValue, Value};
