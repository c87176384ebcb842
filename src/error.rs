use thiserror::Error;

/// Failure taxonomy for the automation loop.
///
/// Everything except `Config` is recoverable: the polling loop downgrades it
/// to a logged miss and retries on the next tick. `Config` is only raised at
/// startup and is fatal.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// OS pixel grab or window query failed. Treated as "not found" by callers.
    #[error("screen capture failed: {0}")]
    Capture(String),

    /// Pointer move / click / key send failed. The cycle retries next tick.
    #[error("input actuation failed: {0}")]
    Actuation(String),

    /// Window focus or enumeration failed mid-action.
    #[error("window operation failed: {0}")]
    Window(String),

    /// Malformed or out-of-range configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AutomationError>;
