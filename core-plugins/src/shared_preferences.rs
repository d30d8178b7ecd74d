//! # Shared Preferences
//!
//! Typed key-value storage over a host [`PreferencesStore`].
//!
//! | Method | Arguments | Reply |
//! |--------|-----------|-------|
//! | `setBool` / `setInt` / `setDouble` / `setString` / `setStringList` | `key`, `value` | `null` |
//! | `remove` | `key` | `true` |
//! | `getAll` | - | map of every key under the prefix |
//! | `clear` | - | `true` |
//! | `commit` | - | `true` |
//!
//! Keys are stored exactly as given; the application layer adds its own
//! namespace. `getAll` and `clear` only see keys starting with the configured
//! prefix (empty by default, which means every key).
//!
//! Every method also takes an optional `filename` naming a preferences file.
//! Files are isolated from each other and from the default file (no
//! `filename`, or an empty one). Named files live in the same store under
//! keys of the form `<filename>\u{1f}<key>`.

use async_trait::async_trait;
use bridge_traits::{BridgeError, PreferenceValue, PreferencesStore};
use core_channel::{
    codes, MethodCall, MethodRouter, Messenger, Plugin, PluginError, Result as ChannelResult,
    Value,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const CHANNEL: &str = "plugins.flutter.io/shared_preferences";

/// Store failure
pub const PREFERENCES_ERROR: &str = "PREFERENCES_ERROR";

/// String value clashing with a reserved type marker
pub const STORAGE_ERROR: &str = "StorageError";

/// Markers that typed values are encoded with by platform stores that only
/// keep strings. A plain string starting with one of them could not be read
/// back with its original type.
pub const RESERVED_PREFIXES: [&str; 3] = [
    // "This is the prefix for a list."
    "VGhpcyBpcyB0aGUgcHJlZml4IGZvciBhIGxpc3Qu",
    // "This is the prefix for BigInteger"
    "VGhpcyBpcyB0aGUgcHJlZml4IGZvciBCaWdJbnRlZ2Vy",
    // "This is the prefix for Double."
    "VGhpcyBpcyB0aGUgcHJlZml4IGZvciBEb3VibGUu",
];

/// Separates a file name from the key in store keys of named files
pub const FILE_SEPARATOR: char = '\u{1f}';

/// Which preferences file a call addresses
#[derive(Debug, Clone, PartialEq, Eq)]
enum PreferencesFile {
    Default,
    Named(String),
}

impl PreferencesFile {
    fn from_call(call: &MethodCall) -> Result<Self, PluginError> {
        match call.argument::<String>("filename")? {
            None => Ok(Self::Default),
            Some(name) if name.is_empty() => Ok(Self::Default),
            Some(name) if name.contains(FILE_SEPARATOR) => Err(PluginError::new(
                codes::INVALID_ARGUMENT,
                "filename contains a reserved separator character",
            )),
            Some(name) => Ok(Self::Named(name)),
        }
    }

    fn store_key(&self, key: &str) -> String {
        match self {
            Self::Default => key.to_string(),
            Self::Named(name) => format!("{name}{FILE_SEPARATOR}{key}"),
        }
    }

    /// The application key for `stored`, if it belongs to this file
    fn own<'a>(&self, stored: &'a str) -> Option<&'a str> {
        match self {
            Self::Default => (!stored.contains(FILE_SEPARATOR)).then_some(stored),
            Self::Named(name) => stored
                .strip_prefix(name.as_str())
                .and_then(|rest| rest.strip_prefix(FILE_SEPARATOR)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Bool,
    Int,
    Double,
    String,
    StringList,
}

pub struct PreferencesState {
    store: Arc<dyn PreferencesStore>,
    prefix: String,
}

/// The shared preferences plugin
pub struct SharedPreferencesPlugin {
    state: Arc<PreferencesState>,
}

impl SharedPreferencesPlugin {
    pub fn new(store: Arc<dyn PreferencesStore>) -> Self {
        Self::with_prefix(store, "")
    }

    /// Limit `getAll` and `clear` to keys starting with `prefix`
    pub fn with_prefix(store: Arc<dyn PreferencesStore>, prefix: impl Into<String>) -> Self {
        Self {
            state: Arc::new(PreferencesState {
                store,
                prefix: prefix.into(),
            }),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.state.prefix
    }

    pub fn router(&self) -> MethodRouter<PreferencesState> {
        MethodRouter::builder(self.state.clone())
            .route("setBool", |state, call| set_value(state, call, Kind::Bool))
            .route("setInt", |state, call| set_value(state, call, Kind::Int))
            .route("setDouble", |state, call| set_value(state, call, Kind::Double))
            .route("setString", |state, call| set_value(state, call, Kind::String))
            .route("setStringList", |state, call| {
                set_value(state, call, Kind::StringList)
            })
            .route("remove", remove)
            .route("getAll", get_all)
            .route("clear", clear)
            .route("commit", commit)
            .build()
    }
}

#[async_trait]
impl Plugin for SharedPreferencesPlugin {
    fn name(&self) -> &str {
        "shared_preferences"
    }

    async fn on_attached(&self, messenger: &Messenger) -> ChannelResult<()> {
        messenger
            .set_method_call_handler(CHANNEL, Arc::new(self.router()))
            .await
    }
}

fn store_error(err: BridgeError) -> PluginError {
    warn!(error = %err, "Preferences store failed");
    PluginError::new(PREFERENCES_ERROR, err.to_string())
}

fn to_value(value: PreferenceValue) -> Value {
    match value {
        PreferenceValue::Bool(b) => Value::Bool(b),
        PreferenceValue::Int(n) => Value::Int(n),
        PreferenceValue::Double(d) => Value::Float(d),
        PreferenceValue::String(s) => Value::String(s),
        PreferenceValue::StringList(items) => items.into(),
    }
}

async fn set_value(
    state: Arc<PreferencesState>,
    call: MethodCall,
    kind: Kind,
) -> Result<Value, PluginError> {
    let file = PreferencesFile::from_call(&call)?;
    let key: String = call.required("key")?;
    let value = match kind {
        Kind::Bool => PreferenceValue::Bool(call.required("value")?),
        Kind::Int => PreferenceValue::Int(call.required("value")?),
        Kind::Double => PreferenceValue::Double(call.required("value")?),
        Kind::StringList => PreferenceValue::StringList(call.required("value")?),
        Kind::String => {
            let value: String = call.required("value")?;
            if RESERVED_PREFIXES.iter().any(|prefix| value.starts_with(prefix)) {
                return Err(PluginError::new(
                    STORAGE_ERROR,
                    "This string cannot be stored as it clashes with special identifier prefixes",
                ));
            }
            PreferenceValue::String(value)
        }
    };

    debug!(key = %key, file = ?file, value_type = value.type_name(), "Setting preference");
    state
        .store
        .set(&file.store_key(&key), value)
        .await
        .map_err(store_error)?;
    Ok(Value::Null)
}

async fn remove(state: Arc<PreferencesState>, call: MethodCall) -> Result<bool, PluginError> {
    let file = PreferencesFile::from_call(&call)?;
    let key: String = call.required("key")?;
    let existed = state
        .store
        .remove(&file.store_key(&key))
        .await
        .map_err(store_error)?;
    debug!(key = %key, file = ?file, existed, "Removed preference");
    Ok(true)
}

async fn get_all(state: Arc<PreferencesState>, call: MethodCall) -> Result<Value, PluginError> {
    let file = PreferencesFile::from_call(&call)?;
    let all = state.store.get_all().await.map_err(store_error)?;
    Ok(all
        .into_iter()
        .filter_map(|(stored, value)| {
            let key = file.own(&stored)?;
            key.starts_with(&state.prefix)
                .then(|| (key.to_string(), to_value(value)))
        })
        .collect())
}

async fn clear(state: Arc<PreferencesState>, call: MethodCall) -> Result<bool, PluginError> {
    let file = PreferencesFile::from_call(&call)?;
    let removed = match &file {
        PreferencesFile::Named(_) => state
            .store
            .clear(&file.store_key(&state.prefix))
            .await
            .map_err(store_error)?,
        // The default file shares the key space with named files
        PreferencesFile::Default => {
            let all = state.store.get_all().await.map_err(store_error)?;
            let mut removed = 0;
            for stored in all.keys() {
                if file.own(stored).is_some_and(|key| key.starts_with(&state.prefix)) {
                    state.store.remove(stored).await.map_err(store_error)?;
                    removed += 1;
                }
            }
            removed
        }
    };
    debug!(prefix = %state.prefix, file = ?file, removed, "Cleared preferences");
    Ok(true)
}

// Writes are committed before `set` returns
async fn commit(_state: Arc<PreferencesState>, _call: MethodCall) -> Result<bool, PluginError> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_channel::{MethodResult, OutboundMessage, Outbox, Response};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<BTreeMap<String, PreferenceValue>>,
    }

    #[async_trait]
    impl PreferencesStore for MemoryStore {
        async fn set(&self, key: &str, value: PreferenceValue) -> bridge_traits::error::Result<()> {
            self.values.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn get(&self, key: &str) -> bridge_traits::error::Result<Option<PreferenceValue>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn get_all(&self) -> bridge_traits::error::Result<BTreeMap<String, PreferenceValue>> {
            Ok(self.values.lock().unwrap().clone())
        }

        async fn remove(&self, key: &str) -> bridge_traits::error::Result<bool> {
            Ok(self.values.lock().unwrap().remove(key).is_some())
        }

        async fn clear(&self, prefix: &str) -> bridge_traits::error::Result<u64> {
            let mut values = self.values.lock().unwrap();
            let before = values.len();
            values.retain(|key, _| !key.starts_with(prefix));
            Ok((before - values.len()) as u64)
        }
    }

    async fn call(router: &MethodRouter<PreferencesState>, call: MethodCall) -> Response {
        let (outbox, mut rx) = Outbox::channel();
        router.dispatch(call, MethodResult::new(1, "test", outbox)).await;
        match rx.recv().await.unwrap() {
            OutboundMessage::Reply { response, .. } => response,
            other => panic!("unexpected message {other:?}"),
        }
    }

    fn args(pairs: Vec<(&str, Value)>) -> Value {
        pairs.into_iter().collect()
    }

    #[tokio::test]
    async fn test_prefix_scopes_get_all_and_clear() {
        let store = Arc::new(MemoryStore::default());
        let plugin = SharedPreferencesPlugin::with_prefix(store.clone(), "flutter.");
        let router = plugin.router();

        for key in ["flutter.a", "native.b"] {
            let response = call(
                &router,
                MethodCall::new("setInt", args(vec![("key", key.into()), ("value", 7.into())])),
            )
            .await;
            assert_eq!(response, Response::Success(Value::Null));
        }

        let all = call(&router, MethodCall::bare("getAll")).await;
        assert_eq!(
            all,
            Response::Success(args(vec![("flutter.a", Value::Int(7))]))
        );

        assert_eq!(
            call(&router, MethodCall::bare("clear")).await,
            Response::Success(Value::Bool(true))
        );
        assert!(store.values.lock().unwrap().contains_key("native.b"));
    }

    #[tokio::test]
    async fn test_reserved_prefix_rejected() {
        let plugin = SharedPreferencesPlugin::new(Arc::new(MemoryStore::default()));
        let router = plugin.router();

        let value = format!("{}payload", RESERVED_PREFIXES[0]);
        let response = call(
            &router,
            MethodCall::new(
                "setString",
                args(vec![("key", "k".into()), ("value", value.into())]),
            ),
        )
        .await;
        assert_eq!(response.error_code(), Some(STORAGE_ERROR));
    }

    #[tokio::test]
    async fn test_wrong_value_type_is_invalid_argument() {
        let plugin = SharedPreferencesPlugin::new(Arc::new(MemoryStore::default()));
        let router = plugin.router();

        let response = call(
            &router,
            MethodCall::new(
                "setBool",
                args(vec![("key", "k".into()), ("value", "yes".into())]),
            ),
        )
        .await;
        assert_eq!(response.error_code(), Some("INVALID_ARGUMENT"));
    }

    #[tokio::test]
    async fn test_double_accepts_whole_numbers() {
        let store = Arc::new(MemoryStore::default());
        let router = SharedPreferencesPlugin::new(store.clone()).router();

        call(
            &router,
            MethodCall::new("setDouble", args(vec![("key", "d".into()), ("value", 3.into())])),
        )
        .await;
        assert_eq!(
            store.values.lock().unwrap().get("d"),
            Some(&PreferenceValue::Double(3.0))
        );
    }

    #[tokio::test]
    async fn test_named_files_are_isolated() {
        let store = Arc::new(MemoryStore::default());
        let router = SharedPreferencesPlugin::with_prefix(store.clone(), "flutter.").router();
        let set = |file: Option<&str>, value: &str| {
            let mut pairs = vec![("key", Value::from("flutter.k")), ("value", value.into())];
            if let Some(file) = file {
                pairs.push(("filename", file.into()));
            }
            MethodCall::new("setString", args(pairs))
        };
        let scoped = |method: &str, file: &str| {
            MethodCall::new(method, args(vec![("filename", file.into())]))
        };

        call(&router, set(None, "default")).await;
        call(&router, set(Some("settings"), "one")).await;
        call(&router, set(Some("cache"), "two")).await;

        assert_eq!(
            call(&router, MethodCall::bare("getAll")).await,
            Response::Success(args(vec![("flutter.k", "default".into())]))
        );
        assert_eq!(
            call(&router, scoped("getAll", "settings")).await,
            Response::Success(args(vec![("flutter.k", "one".into())]))
        );
        assert_eq!(
            call(&router, scoped("getAll", "cache")).await,
            Response::Success(args(vec![("flutter.k", "two".into())]))
        );

        call(&router, scoped("clear", "settings")).await;
        assert_eq!(
            call(&router, scoped("getAll", "settings")).await,
            Response::Success(Value::empty_map())
        );
        assert_eq!(
            call(&router, scoped("getAll", "cache")).await,
            Response::Success(args(vec![("flutter.k", "two".into())]))
        );

        call(&router, MethodCall::bare("clear")).await;
        assert_eq!(
            call(&router, MethodCall::bare("getAll")).await,
            Response::Success(Value::empty_map())
        );
        assert_eq!(
            call(&router, scoped("getAll", "cache")).await,
            Response::Success(args(vec![("flutter.k", "two".into())]))
        );
        assert_eq!(store.values.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filename_with_separator_rejected() {
        let router = SharedPreferencesPlugin::new(Arc::new(MemoryStore::default())).router();
        let filename = format!("bad{FILE_SEPARATOR}name");
        let response = call(
            &router,
            MethodCall::new("getAll", args(vec![("filename", filename.into())])),
        )
        .await;
        assert_eq!(response.error_code(), Some(codes::INVALID_ARGUMENT));
    }

    #[test]
    fn test_method_table() {
        let router = SharedPreferencesPlugin::new(Arc::new(MemoryStore::default())).router();
        assert_eq!(
            router.method_names(),
            vec![
                "clear",
                "commit",
                "getAll",
                "remove",
                "setBool",
                "setDouble",
                "setInt",
                "setString",
                "setStringList"
            ]
        );
    }
}
