//! OS print spooler boundary
//!
//! Everything past this trait is platform plumbing: the dispatcher hands a
//! captured [`PrintArtifact`](crate::PrintArtifact) and a resolved device name
//! to a [`Spooler`] and never cares whether the backend uses a structured
//! print API or writes raw bytes to the device.

pub mod cups;
#[cfg(windows)]
pub mod winspool;

pub use cups::CupsSpooler;
#[cfg(windows)]
pub use winspool::WinSpooler;

use crate::paper::PageSetup;
use crate::printers::Device;
use crate::{PrintArtifact, Result};
use std::sync::Arc;

/// Platform print spooler
///
/// Calls may block (they shell out or call into the OS); the dispatcher runs
/// them on the blocking thread pool.
pub trait Spooler: Send + Sync {
    /// Snapshot of the currently installed devices.
    fn devices(&self) -> Result<Vec<Device>>;

    /// Send a captured document to `device`.
    ///
    /// Implementations report [`Error::PrinterUnavailable`](crate::Error::PrinterUnavailable)
    /// when the device is gone and [`Error::DispatchError`](crate::Error::DispatchError)
    /// for any other failure.
    fn submit(&self, device: &str, artifact: &PrintArtifact, setup: &PageSetup) -> Result<()>;
}

/// Spooler for the current platform.
#[cfg(windows)]
pub fn system_spooler() -> Arc<dyn Spooler> {
    Arc::new(WinSpooler::new())
}

/// Spooler for the current platform.
#[cfg(not(windows))]
pub fn system_spooler() -> Arc<dyn Spooler> {
    Arc::new(CupsSpooler::default())
}
