use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BrowserError>;

/// Errors raised while capturing or rebuilding a page snapshot
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The in-page extraction call failed. Never retried here.
    #[error("Extraction bridge call failed: {0}")]
    BridgeFailed(String),

    /// A textual payload could not be decoded
    #[error("Failed to decode snapshot payload: {0}")]
    DecodeFailed(String),

    /// The decoded payload (or a single record) does not have the expected shape
    #[error("Invalid snapshot structure: {0}")]
    InvalidStructure(String),

    /// The root id does not resolve to a built element node
    #[error("Failed to resolve root node: {0}")]
    RootResolutionFailed(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),
}

impl BrowserError {
    /// Whether the error aborted a reconstruction after the bridge returned
    pub fn is_reconstruction_error(&self) -> bool {
        matches!(
            self,
            BrowserError::DecodeFailed(_) | BrowserError::InvalidStructure(_) | BrowserError::RootResolutionFailed(_)
        )
    }
}
