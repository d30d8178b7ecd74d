use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported on this device: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Short, machine-matchable name of the failure.
    ///
    /// Plugins use this as the error code when a host capability fails, the
    /// same way a native SDK exception's class name ends up on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NotAvailable(_) => "NotAvailable",
            BridgeError::OperationFailed(_) => "OperationFailed",
            BridgeError::Storage(_) => "StorageError",
            BridgeError::PermissionDenied(_) => "PermissionDenied",
            BridgeError::Unsupported(_) => "Unsupported",
            BridgeError::Io(_) => "IOException",
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(BridgeError::Storage("x".into()).kind(), "StorageError");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(BridgeError::from(io).kind(), "IOException");
    }
}
