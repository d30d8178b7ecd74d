//! # Handle Registry
//!
//! Maps opaque integer handles issued to the application layer onto native
//! resources owned by a plugin instance.
//!
//! Handles are allocated monotonically from 1 and never reused within one
//! registry. Every resource is disposed exactly once: either by
//! [`HandleRegistry::dispose`] or by the [`HandleRegistry::dispose_all`]
//! teardown sweep. Both remove the mapping before disposing, so a sweep
//! racing an explicit dispose cannot release the same resource twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{ChannelError, Result};
use crate::value::{FromValue, Value, ValueTypeError};

/// Opaque handle to a native resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub i64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Handle> for Value {
    fn from(handle: Handle) -> Self {
        Value::Int(handle.0)
    }
}

impl FromValue for Handle {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueTypeError> {
        i64::from_value(value).map(Handle)
    }
}

/// A native resource released explicitly.
pub trait NativeResource: Send + Sync + 'static {
    /// Release the underlying native resource.
    fn dispose(&self);
}

/// Plugin-owned arena of native resources keyed by [`Handle`].
pub struct HandleRegistry<R: NativeResource> {
    kind: &'static str,
    next: AtomicI64,
    entries: RwLock<HashMap<Handle, Arc<R>>>,
}

impl<R: NativeResource> HandleRegistry<R> {
    /// `kind` names the handle in errors, e.g. `"textureId"`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            next: AtomicI64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn allocate(&self) -> Handle {
        Handle(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Take ownership of `resource` and issue a handle for it.
    pub async fn insert(&self, resource: R) -> Handle {
        self.insert_with(|_| resource).await
    }

    /// Issue a handle, then build the resource knowing its handle.
    pub async fn insert_with<F>(&self, build: F) -> Handle
    where
        F: FnOnce(Handle) -> R,
    {
        let handle = self.allocate();
        let resource = Arc::new(build(handle));
        self.entries.write().await.insert(handle, resource);
        debug!(kind = self.kind, %handle, "Handle issued");
        handle
    }

    pub async fn get(&self, handle: Handle) -> Result<Arc<R>> {
        self.entries
            .read()
            .await
            .get(&handle)
            .cloned()
            .ok_or(ChannelError::UnknownHandle {
                kind: self.kind,
                handle,
            })
    }

    pub async fn contains(&self, handle: Handle) -> bool {
        self.entries.read().await.contains_key(&handle)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Outstanding handles in allocation order.
    pub async fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.entries.read().await.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Remove the mapping and dispose the resource.
    pub async fn dispose(&self, handle: Handle) -> Result<()> {
        let resource = self.entries.write().await.remove(&handle);
        match resource {
            Some(resource) => {
                resource.dispose();
                debug!(kind = self.kind, %handle, "Handle disposed");
                Ok(())
            }
            None => Err(ChannelError::UnknownHandle {
                kind: self.kind,
                handle,
            }),
        }
    }

    /// Teardown sweep: dispose every outstanding resource.
    ///
    /// Returns how many were disposed.
    pub async fn dispose_all(&self) -> usize {
        let drained: Vec<(Handle, Arc<R>)> = self.entries.write().await.drain().collect();
        for (_, resource) in &drained {
            resource.dispose();
        }
        if !drained.is_empty() {
            info!(kind = self.kind, count = drained.len(), "Outstanding handles swept");
        }
        drained.len()
    }
}

impl<R: NativeResource> fmt::Debug for HandleRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("kind", &self.kind)
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Texture {
        disposed: Arc<AtomicUsize>,
    }

    impl NativeResource for Texture {
        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_handles_are_monotonic() {
        let registry = HandleRegistry::new("textureId");
        let counter = Arc::new(AtomicUsize::new(0));

        let a = registry.insert(Texture { disposed: counter.clone() }).await;
        registry.dispose(a).await.unwrap();
        let b = registry.insert(Texture { disposed: counter.clone() }).await;

        assert_eq!(a, Handle(1));
        assert_eq!(b, Handle(2));
    }

    #[tokio::test]
    async fn test_dispose_unknown_handle() {
        let registry: HandleRegistry<Texture> = HandleRegistry::new("textureId");
        let err = registry.dispose(Handle(9)).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown textureId: 9");
    }

    #[tokio::test]
    async fn test_insert_with_sees_handle() {
        let registry = HandleRegistry::new("textureId");
        let counter = Arc::new(AtomicUsize::new(0));
        let mut seen = None;

        let handle = registry
            .insert_with(|handle| {
                seen = Some(handle);
                Texture { disposed: counter }
            })
            .await;
        assert_eq!(seen, Some(handle));
    }
}
