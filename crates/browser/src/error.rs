//! Browser-side error types.

use thiserror::Error;

/// Errors raised while talking to the browser-manager or the attached page.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser-manager unreachable: {0}")]
    ManagerUnreachable(String),

    #[error("browser-manager rejected the request: {0}")]
    ManagerRejected(String),

    #[error("browser-manager response is missing the debug endpoint")]
    MissingEndpoint,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("attached browser has no usable page")]
    NoContext,

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}
