//! Preferences and Directory Abstractions
//!
//! Provides platform-agnostic traits for key-value preference storage and for
//! locating the well-known application directories.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;

/// A single stored preference value.
///
/// Mirrors the value types the preferences API accepts from the application
/// layer. Values keep their type across a store/load cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    StringList(Vec<String>),
}

impl PreferenceValue {
    /// Name of the stored type, used as the type column by persistent stores.
    pub fn type_name(&self) -> &'static str {
        match self {
            PreferenceValue::Bool(_) => "bool",
            PreferenceValue::Int(_) => "int",
            PreferenceValue::Double(_) => "double",
            PreferenceValue::String(_) => "string",
            PreferenceValue::StringList(_) => "string_list",
        }
    }
}

/// Key-value preferences storage trait
///
/// Abstracts platform-specific preferences storage:
/// - iOS: UserDefaults
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite-backed store
/// - Tests: in-memory maps or mocks
///
/// Every write is committed before the returned future resolves.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{PreferencesStore, PreferenceValue};
///
/// async fn save_theme(store: &dyn PreferencesStore) -> Result<()> {
///     store.set("flutter.theme", PreferenceValue::String("dark".into())).await
/// }
/// ```
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Store a value, replacing any previous value (of any type) for the key
    async fn set(&self, key: &str, value: PreferenceValue) -> Result<()>;

    /// Retrieve a single value
    async fn get(&self, key: &str) -> Result<Option<PreferenceValue>>;

    /// Retrieve every stored value, ordered by key
    async fn get_all(&self) -> Result<BTreeMap<String, PreferenceValue>>;

    /// Remove a value
    ///
    /// Returns `true` if the key existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove every key starting with `prefix` (an empty prefix clears all)
    ///
    /// Returns the number of removed keys.
    async fn clear(&self, prefix: &str) -> Result<u64>;
}

/// Well-known application directories
///
/// Abstracts the platform's notion of per-application storage locations:
/// - Android: `Context.getCacheDir()`, `getDataDir()`, external storage
/// - iOS: `NSTemporaryDirectory`, `NSDocumentDirectory`, Application Support
/// - Desktop: XDG / Known Folders / `~/Library`
///
/// Methods return `Ok(None)` when the platform has no such location
/// (e.g. external storage on iOS).
#[async_trait]
pub trait PathProvider: Send + Sync {
    /// Directory for temporary files the system may purge
    async fn temporary_directory(&self) -> Result<Option<PathBuf>>;

    /// Directory for user-visible documents
    async fn documents_directory(&self) -> Result<Option<PathBuf>>;

    /// Directory for application support files not visible to the user
    async fn support_directory(&self) -> Result<Option<PathBuf>>;

    /// Shared/external storage directory
    async fn external_storage_directory(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}
