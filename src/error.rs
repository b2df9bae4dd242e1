//! Error types for the print bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bridging a print request to a printer
#[derive(Error, Debug)]
pub enum Error {
    /// The embedded content could not be read (cross-origin or detached frame)
    #[error("Could not capture document: {0}")]
    CaptureFailure(String),

    /// The off-screen surface did not report load completion in time
    #[error("Render timed out after {0}ms")]
    RenderTimeout(u64),

    /// No usable printer device was found
    #[error("Printer unavailable: {0}")]
    PrinterUnavailable(String),

    /// The OS print call failed or threw
    #[error("Print dispatch failed: {0}")]
    DispatchError(String),

    /// Releasing a surface or temporary document failed
    #[error("Resource cleanup failed: {0}")]
    ResourceCleanupFailure(String),

    /// The rendering surface failed for a reason other than a timeout
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// A message from the embedded content was not a valid print intent
    #[error("Invalid message: {0}")]
    MessageError(String),

    /// Settings could not be read or written
    #[error("Settings error: {0}")]
    SettingsError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short, user-facing description of the likely cause.
    ///
    /// Used for the single notification shown when a print request could not
    /// be completed even after fallback; it never exposes job state details.
    pub fn user_hint(&self) -> &'static str {
        match self {
            Error::PrinterUnavailable(_) => {
                "printer unavailable. Check that a printer is installed and switched on."
            }
            Error::RenderTimeout(_) => "the document took too long to load. Try printing again.",
            Error::DispatchError(_) => "the printer rejected the job. Check the printer and its queue.",
            Error::CaptureFailure(_) | Error::RenderError(_) => {
                "the document could not be prepared for printing."
            }
            _ => "an unexpected error occurred.",
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
