use thiserror::Error;

use crate::codec::CodecError;
use crate::envelope::PluginError;
use crate::handles::Handle;
use crate::messenger::ReplyId;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Unknown {kind}: {handle}")]
    UnknownHandle { kind: &'static str, handle: Handle },

    #[error("Result for reply {reply_id} already completed")]
    AlreadyCompleted { reply_id: ReplyId },

    #[error("Channel already registered: {0}")]
    DuplicateChannel(String),

    #[error("Outbound queue closed")]
    Closed,

    #[error("Plugin host is not attached")]
    NotAttached,

    #[error("Plugin {plugin} failed to attach: {message}")]
    AttachFailed { plugin: String, message: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

impl From<ChannelError> for PluginError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::UnknownHandle { kind, handle } => PluginError::new(
                format!("Unknown {kind}"),
                format!("No native resource associated with {kind} {handle}"),
            ),
            other => PluginError::new("CHANNEL_ERROR", other.to_string()),
        }
    }
}
