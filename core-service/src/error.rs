use core_channel::ChannelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Plugin service is stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
