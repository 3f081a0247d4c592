//! Error types for the prerendering service

use thiserror::Error;

/// Result type alias for render and gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering or serving
///
/// None of these ever escape `PreRenderer::render`; the render boundary
/// collapses every failure into the bad-request `RenderResult` plus a log
/// line. The taxonomy exists so the logs can tell a navigation problem from
/// an unexpected one.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch or connect to the browser
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// Navigation threw (network error, invalid URL, navigation timeout)
    #[error("Navigation failed: {0}")]
    NavigationError(String),

    /// Navigation finished without a document response to derive status from
    #[error("Navigation produced no response")]
    MissingResponse,

    /// Evaluating a script against the live document failed
    #[error("Script evaluation failed: {0}")]
    ScriptError(String),

    /// A bounded wait exceeded its deadline
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The HTTP gateway could not bind or serve
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// CDP-level error surfaced by the browser backend
    #[error("CDP error: {0}")]
    CdpError(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
