//! # Path Provider
//!
//! Well-known application directories from the host [`PathProvider`].
//! Each method replies the directory as a string, or `null` when the
//! platform has no such location.

use async_trait::async_trait;
use bridge_traits::PathProvider;
use core_channel::{MethodRouter, Messenger, Plugin, PluginError, Result as ChannelResult};
use std::path::PathBuf;
use std::sync::Arc;

pub const CHANNEL: &str = "plugins.flutter.io/path_provider";

pub struct PathState {
    provider: Arc<dyn PathProvider>,
}

#[derive(Debug, Clone, Copy)]
enum Directory {
    Temporary,
    Documents,
    Support,
    Storage,
}

/// The path provider plugin
pub struct PathProviderPlugin {
    state: Arc<PathState>,
}

impl PathProviderPlugin {
    pub fn new(provider: Arc<dyn PathProvider>) -> Self {
        Self {
            state: Arc::new(PathState { provider }),
        }
    }

    pub fn router(&self) -> MethodRouter<PathState> {
        MethodRouter::builder(self.state.clone())
            .route("getTemporaryDirectory", |state, _call| {
                directory(state, Directory::Temporary)
            })
            .route("getApplicationDocumentsDirectory", |state, _call| {
                directory(state, Directory::Documents)
            })
            .route("getApplicationSupportDirectory", |state, _call| {
                directory(state, Directory::Support)
            })
            .route("getStorageDirectory", |state, _call| {
                directory(state, Directory::Storage)
            })
            .build()
    }
}

#[async_trait]
impl Plugin for PathProviderPlugin {
    fn name(&self) -> &str {
        "path_provider"
    }

    async fn on_attached(&self, messenger: &Messenger) -> ChannelResult<()> {
        messenger
            .set_method_call_handler(CHANNEL, Arc::new(self.router()))
            .await
    }
}

async fn directory(state: Arc<PathState>, which: Directory) -> Result<Option<String>, PluginError> {
    let provider = &state.provider;
    let path: Option<PathBuf> = match which {
        Directory::Temporary => provider.temporary_directory().await?,
        Directory::Documents => provider.documents_directory().await?,
        Directory::Support => provider.support_directory().await?,
        Directory::Storage => provider.external_storage_directory().await?,
    };
    Ok(path.map(|path| path.to_string_lossy().into_owned()))
}
