//! # Result Sink
//!
//! [`MethodResult`] is the write-once completion handle for one call. Every
//! completion method consumes the result, so completing twice does not
//! compile; dropping it unresolved still produces an error reply.
//!
//! Completion is a message handoff onto the [`Outbox`]; it can happen from
//! any thread or task, long after the handler returned.
//!
//! ```rust,ignore
//! async fn on_method_call(&self, call: MethodCall, result: MethodResult) {
//!     let store = self.store.clone();
//!     tokio::spawn(async move {
//!         match store.get_all().await {
//!             Ok(values) => result.success(encode(values)),
//!             Err(e) => result.error_from(e),
//!         }
//!     });
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

use crate::envelope::{codes, PluginError, Response};
use crate::error::ChannelError;
use crate::messenger::{OutboundMessage, Outbox, ReplyId};
use crate::value::Value;

const UNGUARDED: u8 = 0;
const GUARDED: u8 = 1;
const DROPPED: u8 = 2;
const PANICKED: u8 = 3;

/// How a result left a guarded scope without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abandoned {
    Dropped,
    Panicked,
}

/// Reply bookkeeping shared between a result and the router that issued it.
#[derive(Debug)]
pub(crate) struct ReplySlot {
    reply_id: ReplyId,
    method: String,
    outbox: Outbox,
    completed: AtomicBool,
    guard: AtomicU8,
}

impl ReplySlot {
    /// Post `response` unless the reply was already sent.
    pub(crate) fn complete(&self, response: Response) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if !self.outbox.post(OutboundMessage::Reply {
            reply_id: self.reply_id,
            response,
        }) {
            debug!(
                reply_id = self.reply_id,
                method = %self.method,
                "Reply discarded, bridge detached"
            );
        }
        true
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// While guarded, a dropped result leaves the reply to the router that
    /// set the guard.
    pub(crate) fn guard(&self) {
        self.guard.store(GUARDED, Ordering::Release);
    }

    /// Lift the guard, reporting a result abandoned in the meantime whose
    /// reply is still owed.
    pub(crate) fn release(&self) -> Option<Abandoned> {
        let state = self.guard.swap(UNGUARDED, Ordering::AcqRel);
        if self.is_completed() {
            return None;
        }
        match state {
            DROPPED => Some(Abandoned::Dropped),
            PANICKED => Some(Abandoned::Panicked),
            _ => None,
        }
    }

    fn abandon_to_guard(&self, panicking: bool) -> bool {
        let state = if panicking { PANICKED } else { DROPPED };
        self.guard
            .compare_exchange(GUARDED, state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Single-use sink for the outcome of one call.
#[derive(Debug)]
#[must_use = "a MethodResult must be completed; dropping it replies RESULT_DROPPED"]
pub struct MethodResult {
    slot: Arc<ReplySlot>,
}

impl MethodResult {
    pub fn new(reply_id: ReplyId, method: impl Into<String>, outbox: Outbox) -> Self {
        Self {
            slot: Arc::new(ReplySlot {
                reply_id,
                method: method.into(),
                outbox,
                completed: AtomicBool::new(false),
                guard: AtomicU8::new(UNGUARDED),
            }),
        }
    }

    pub fn reply_id(&self) -> ReplyId {
        self.slot.reply_id
    }

    pub fn method(&self) -> &str {
        &self.slot.method
    }

    pub(crate) fn slot(&self) -> Arc<ReplySlot> {
        self.slot.clone()
    }

    pub fn success(self, value: impl Into<Value>) {
        self.complete(Response::Success(value.into()));
    }

    /// Complete with an error. Pass `()` for no details.
    pub fn error(self, code: impl Into<String>, message: impl Into<String>, details: impl Into<Value>) {
        self.error_from(PluginError::new(code, message).with_details(details));
    }

    pub fn error_from(self, error: impl Into<PluginError>) {
        self.complete(Response::Error(error.into()));
    }

    pub fn not_implemented(self) {
        self.complete(Response::NotImplemented);
    }

    pub fn complete(self, response: Response) {
        self.slot.complete(response);
    }

    /// Share this result between callbacks that race to complete it.
    pub fn into_shared(self) -> SharedMethodResult {
        SharedMethodResult::new(self)
    }
}

impl Drop for MethodResult {
    fn drop(&mut self) {
        if self.slot.is_completed() {
            return;
        }

        let panicking = std::thread::panicking();
        if self.slot.abandon_to_guard(panicking) {
            return;
        }

        let (code, message) = if panicking {
            (codes::HANDLER_PANIC, "Handler panicked before completing")
        } else {
            (codes::RESULT_DROPPED, "Result dropped without completion")
        };
        error!(
            reply_id = self.slot.reply_id,
            method = %self.slot.method,
            code,
            "{message}"
        );
        self.slot
            .complete(Response::Error(PluginError::new(code, message)));
    }
}

/// A [`MethodResult`] that several callbacks may try to complete.
///
/// The first write wins; later writes return
/// [`ChannelError::AlreadyCompleted`] and log a warning.
#[derive(Debug, Clone)]
pub struct SharedMethodResult {
    reply_id: ReplyId,
    inner: Arc<Mutex<Option<MethodResult>>>,
}

impl SharedMethodResult {
    pub fn new(result: MethodResult) -> Self {
        Self {
            reply_id: result.reply_id(),
            inner: Arc::new(Mutex::new(Some(result))),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn try_success(&self, value: impl Into<Value>) -> Result<(), ChannelError> {
        self.try_complete(Response::Success(value.into()))
    }

    pub fn try_error(
        &self,
        code: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<Value>,
    ) -> Result<(), ChannelError> {
        self.try_complete(Response::Error(
            PluginError::new(code, message).with_details(details),
        ))
    }

    pub fn try_error_from(&self, error: impl Into<PluginError>) -> Result<(), ChannelError> {
        self.try_complete(Response::Error(error.into()))
    }

    pub fn try_not_implemented(&self) -> Result<(), ChannelError> {
        self.try_complete(Response::NotImplemented)
    }

    pub fn try_complete(&self, response: Response) -> Result<(), ChannelError> {
        let taken = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match taken {
            Some(result) => {
                result.complete(response);
                Ok(())
            }
            None => {
                warn!(
                    reply_id = self.reply_id,
                    ?response,
                    "Second completion of a method result ignored"
                );
                Err(ChannelError::AlreadyCompleted {
                    reply_id: self.reply_id,
                })
            }
        }
    }
}
