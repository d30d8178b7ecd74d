//! # Call Router
//!
//! Exact-match table from method name to handler, frozen at build time.
//!
//! ```rust,ignore
//! let router = MethodRouter::builder(state)
//!     .route("check", |state, _call| async move {
//!         Ok(state.monitor.check().await?.as_str())
//!     })
//!     .route_deferred("launch", |state, call, result| async move {
//!         tokio::spawn(launch_later(state, call, result));
//!     })
//!     .build();
//! ```
//!
//! Immediate routes return their outcome; the router completes the result.
//! Deferred routes own the [`MethodResult`] and complete it themselves,
//! possibly from another task. A panic escaping either kind is caught here
//! and answered with `HANDLER_PANIC`.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::call::MethodCall;
use crate::envelope::{codes, PluginError, Response};
use crate::messenger::MethodCallHandler;
use crate::result::{Abandoned, MethodResult};
use crate::value::Value;

type ImmediateHandler<S> =
    Arc<dyn Fn(Arc<S>, MethodCall) -> BoxFuture<'static, Result<Value, PluginError>> + Send + Sync>;

type DeferredHandler<S> =
    Arc<dyn Fn(Arc<S>, MethodCall, MethodResult) -> BoxFuture<'static, ()> + Send + Sync>;

enum Route<S> {
    Immediate(ImmediateHandler<S>),
    Deferred(DeferredHandler<S>),
}

/// Builder for [`MethodRouter`].
pub struct MethodRouterBuilder<S> {
    state: Arc<S>,
    routes: HashMap<String, Route<S>>,
}

impl<S: Send + Sync + 'static> MethodRouterBuilder<S> {
    /// Register a handler whose returned value completes the call.
    pub fn route<F, Fut, T>(self, method: &str, handler: F) -> Self
    where
        F: Fn(Arc<S>, MethodCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, PluginError>> + Send + 'static,
        T: Into<Value>,
    {
        let handler: ImmediateHandler<S> = Arc::new(move |state, call| {
            let fut = handler(state, call);
            async move { fut.await.map(Into::into) }.boxed()
        });
        self.insert(method, Route::Immediate(handler))
    }

    /// Register a handler that completes the [`MethodResult`] itself.
    pub fn route_deferred<F, Fut>(self, method: &str, handler: F) -> Self
    where
        F: Fn(Arc<S>, MethodCall, MethodResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: DeferredHandler<S> =
            Arc::new(move |state, call, result| handler(state, call, result).boxed());
        self.insert(method, Route::Deferred(handler))
    }

    fn insert(mut self, method: &str, route: Route<S>) -> Self {
        if self.routes.contains_key(method) {
            warn!(method, "Duplicate route ignored, first registration kept");
        } else {
            self.routes.insert(method.to_string(), route);
        }
        self
    }

    /// Freeze the table.
    pub fn build(self) -> MethodRouter<S> {
        MethodRouter {
            state: self.state,
            routes: self.routes,
        }
    }
}

/// Immutable method-name dispatch table over shared plugin state.
pub struct MethodRouter<S> {
    state: Arc<S>,
    routes: HashMap<String, Route<S>>,
}

impl<S: Send + Sync + 'static> MethodRouter<S> {
    /// Start a table over `state`, which the plugin typically shares.
    pub fn builder(state: Arc<S>) -> MethodRouterBuilder<S> {
        MethodRouterBuilder {
            state,
            routes: HashMap::new(),
        }
    }

    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    pub fn handles(&self, method: &str) -> bool {
        self.routes.contains_key(method)
    }

    /// Recognized method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Route `call` and complete `result` exactly once.
    pub async fn dispatch(&self, call: MethodCall, result: MethodResult) {
        let Some(route) = self.routes.get(call.method()) else {
            debug!(method = call.method(), "No route, not implemented");
            result.not_implemented();
            return;
        };

        let method = call.method().to_string();
        let state = self.state.clone();

        match route {
            Route::Immediate(handler) => {
                let handler = handler.clone();
                // Calling inside the async block also catches synchronous panics
                let outcome = AssertUnwindSafe(async move { handler(state, call).await })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(value)) => result.success(value),
                    Ok(Err(err)) => {
                        debug!(method = %method, code = %err.code, "Handler returned error");
                        result.error_from(err);
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(method = %method, panic = %message, "Handler panicked");
                        result.error(codes::HANDLER_PANIC, message, ());
                    }
                }
            }
            Route::Deferred(handler) => {
                let handler = handler.clone();
                let slot = result.slot();
                slot.guard();
                let outcome = AssertUnwindSafe(async move { handler(state, call, result).await })
                    .catch_unwind()
                    .await;
                let abandoned = slot.release();

                let response = match (outcome, abandoned) {
                    (Err(panic), _) => {
                        let message = panic_message(panic.as_ref());
                        error!(method = %method, panic = %message, "Deferred handler panicked");
                        if slot.is_completed() {
                            return;
                        }
                        PluginError::new(codes::HANDLER_PANIC, message)
                    }
                    (Ok(()), Some(Abandoned::Panicked)) => {
                        error!(method = %method, "Deferred result abandoned by a panicking task");
                        PluginError::new(codes::HANDLER_PANIC, "Handler panicked before completing")
                    }
                    (Ok(()), Some(Abandoned::Dropped)) => {
                        error!(method = %method, "Deferred result dropped without completion");
                        PluginError::new(codes::RESULT_DROPPED, "Result dropped without completion")
                    }
                    (Ok(()), None) => return,
                };
                slot.complete(Response::Error(response));
            }
        }
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> MethodCallHandler for MethodRouter<S> {
    async fn on_method_call(&self, call: MethodCall, result: MethodResult) {
        self.dispatch(call, result).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::{OutboundMessage, Outbox};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    async fn run(router: &MethodRouter<Counter>, call: MethodCall) -> Response {
        let (outbox, mut rx) = Outbox::channel();
        router.dispatch(call, MethodResult::new(1, "m", outbox)).await;
        let message = rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err(), "more than one completion");
        match message {
            OutboundMessage::Reply { response, .. } => response,
            other => panic!("unexpected message {other:?}"),
        }
    }

    fn router() -> MethodRouter<Counter> {
        MethodRouter::builder(Arc::new(Counter::default()))
            .route("count", |state: Arc<Counter>, _call| async move {
                Ok::<_, PluginError>(state.calls.fetch_add(1, Ordering::SeqCst) as i64 + 1)
            })
            .route("fail", |_state, _call| async move {
                Err::<(), _>(PluginError::new("IOException", "disk gone"))
            })
            .route("boom", |_state, _call| async move {
                if true {
                    panic!("exploded");
                }
                Ok::<_, PluginError>(())
            })
            .route_deferred("later", |_state, call, result| async move {
                tokio::spawn(async move { result.success(call.into_arguments()) });
            })
            .route_deferred("lost", |_state, _call, result| async move {
                drop(result);
            })
            .route_deferred("deferred_boom", |_state, _call, result| async move {
                let _held = result;
                panic!("deferred exploded");
            })
            .route_deferred("deferred_drop_first", |_state, _call, result| async move {
                drop(result);
                panic!("exploded after drop");
            })
            .build()
    }

    #[tokio::test]
    async fn test_unknown_method_not_implemented() {
        let router = router();
        let response = run(&router, MethodCall::bare("nope")).await;
        assert_eq!(response, Response::NotImplemented);
        assert_eq!(router.state().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_immediate_success_and_error() {
        let router = router();
        assert_eq!(run(&router, MethodCall::bare("count")).await, Response::Success(Value::Int(1)));

        let response = run(&router, MethodCall::bare("fail")).await;
        assert_eq!(response.error_code(), Some("IOException"));
    }

    #[tokio::test]
    async fn test_panics_become_errors() {
        let router = router();
        match run(&router, MethodCall::bare("boom")).await {
            Response::Error(err) => {
                assert_eq!(err.code, codes::HANDLER_PANIC);
                assert_eq!(err.message.as_deref(), Some("exploded"));
            }
            other => panic!("unexpected response {other:?}"),
        }

        match run(&router, MethodCall::bare("deferred_boom")).await {
            Response::Error(err) => {
                assert_eq!(err.code, codes::HANDLER_PANIC);
                assert_eq!(err.message.as_deref(), Some("deferred exploded"));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deferred_drop_then_panic_reports_panic() {
        let router = router();
        match run(&router, MethodCall::bare("deferred_drop_first")).await {
            Response::Error(err) => {
                assert_eq!(err.code, codes::HANDLER_PANIC);
                assert_eq!(err.message.as_deref(), Some("exploded after drop"));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_result_dropped_by_spawned_task_after_dispatch() {
        let router = MethodRouter::builder(Arc::new(Counter::default()))
            .route_deferred("detached", |_state, _call, result| async move {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    drop(result);
                });
            })
            .build();
        assert_eq!(
            run(&router, MethodCall::bare("detached")).await.error_code(),
            Some(codes::RESULT_DROPPED)
        );
    }

    #[tokio::test]
    async fn test_deferred_routes() {
        let router = router();
        assert_eq!(
            run(&router, MethodCall::new("later", "payload")).await,
            Response::Success(Value::from("payload"))
        );
        assert_eq!(
            run(&router, MethodCall::bare("lost")).await.error_code(),
            Some(codes::RESULT_DROPPED)
        );
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let router = MethodRouter::builder(Arc::new(Counter::default()))
            .route("m", |_s, _c| async { Ok::<_, PluginError>("first") })
            .route("m", |_s, _c| async { Ok::<_, PluginError>("second") })
            .build();

        assert_eq!(router.method_names(), vec!["m"]);
        assert_eq!(run(&router, MethodCall::bare("m")).await, Response::Success(Value::from("first")));
    }
}
