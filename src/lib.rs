//! printbridge
//!
//! Silent printing for web applications hosted in an embedded webview.
//!
//! Pages call `window.print()` as usual. An injected interception script
//! captures the document and posts it to the native side, where the bridge
//! resolves a printer, renders the markup off-screen at the width of the
//! loaded paper (A4, 58 mm or 80 mm receipt rolls) and hands the result to the
//! OS spooler without showing a dialog. When silent printing fails the
//! request escalates once, to the system default printer or to the visible
//! print dialog.
//!
//! # Features
//!
//! - **headless** (default): pure-Rust text renderer for receipt printers
//! - **cdp**: headless Chrome renderer producing PDF output
//!
//! # Example
//!
//! ```no_run
//! use printbridge::{BridgeParts, HostUi, DialogRequest, PrintBridge};
//! use printbridge::config::JsonSettingsStore;
//! use std::sync::Arc;
//!
//! struct Ui;
//! impl HostUi for Ui {
//!     fn present_dialog(&self, _request: &DialogRequest) -> printbridge::Result<()> {
//!         Ok(())
//!     }
//!     fn notify(&self, message: &str) {
//!         eprintln!("{}", message);
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = printbridge::BridgeOptions::default();
//! let bridge = PrintBridge::new(BridgeParts {
//!     settings: Arc::new(JsonSettingsStore::open_default()?),
//!     spooler: printbridge::spooler::system_spooler(),
//!     surfaces: printbridge::default_surfaces(&options)?,
//!     ui: Arc::new(Ui),
//!     options,
//!     observer: None,
//! });
//!
//! // inject `bridge.interceptor_script()` into the webview, then forward
//! // every message it posts:
//! let ticket = bridge.handle_message(r#"{"type":"print","html":"<p>Total 9.50</p>"}"#)?;
//! let outcome = ticket.outcome().await?;
//! println!("{} -> {:?}", outcome.id, outcome.completion);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use tokio::sync::oneshot;

pub mod error;
pub use error::{Error, Result};

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod fallback;
pub mod interceptor;
pub mod job;
pub mod normalize;
pub mod paper;
pub mod printers;
pub mod render;
pub mod spooler;

// Pure-Rust text renderer
#[cfg(feature = "headless")]
pub mod headless;

// Chrome DevTools Protocol renderer
#[cfg(feature = "cdp")]
pub mod cdp;

pub use bridge::{BridgeParts, JobTicket, PrintBridge};
pub use config::{PaperFormat, PrinterConfig, Settings, SettingsPatch, SettingsStore};
pub use dispatch::StateObserver;
pub use fallback::{FallbackAction, FallbackPolicy};
pub use interceptor::{InterceptorOptions, MessageTransport, PrintRequest};
pub use job::{Completion, JobId, JobOutcome, JobState, PrintSource};
pub use paper::{PageSetup, PaperProfile};
pub use printers::Device;

/// Bridge tuning
///
/// Defaults follow what receipt-printing deployments need: a generous load
/// timeout, a short settle delay so late layout (web fonts, images) lands
/// before capture, and fallback enabled.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Maximum time an off-screen surface may take to load, in milliseconds
    pub render_timeout_ms: u64,
    /// Delay between load completion and capture, in milliseconds
    pub settle_delay_ms: u64,
    /// Escalate failed silent prints (retry on default, then dialog)
    pub fallback_enabled: bool,
    /// Directory for materialized documents (system temp dir when `None`)
    pub temp_dir: Option<PathBuf>,
    /// Options for the generated interception script
    pub interceptor: InterceptorOptions,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            render_timeout_ms: 30000,
            settle_delay_ms: 300,
            fallback_enabled: true,
            temp_dir: None,
            interceptor: InterceptorOptions::default(),
        }
    }
}

/// Format of a captured print artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pdf,
    /// Plain text laid out for the paper's character columns
    Text,
    /// Device-specific data sent to the printer untouched
    Raw,
}

impl ArtifactKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Text => "text/plain",
            ArtifactKind::Raw => "application/octet-stream",
        }
    }
}

/// Output captured from a rendered surface, ready for the spooler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintArtifact {
    pub kind: ArtifactKind,
    pub data: Vec<u8>,
}

impl PrintArtifact {
    pub fn pdf(data: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::Pdf,
            data,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Text,
            data: text.into().into_bytes(),
        }
    }

    pub fn raw(data: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::Raw,
            data,
        }
    }
}

/// Completion handle passed to [`Surface::load`]
///
/// The surface reports the end of loading exactly once, from any thread.
/// Dropping the signal without reporting is treated as a render failure.
#[derive(Debug)]
pub struct LoadSignal {
    tx: oneshot::Sender<Result<()>>,
}

impl LoadSignal {
    pub fn channel() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn loaded(self) {
        let _ = self.tx.send(Ok(()));
    }

    pub fn failed(self, err: Error) {
        let _ = self.tx.send(Err(err));
    }
}

/// Size of an off-screen surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceOptions {
    pub width_px: u32,
    pub height_px: u32,
}

impl SurfaceOptions {
    pub fn for_paper(paper: &PaperProfile) -> Self {
        Self {
            width_px: paper.pixel_width,
            height_px: 800,
        }
    }
}

/// A rendering surface: an off-screen view created for one job, or the
/// primary view of the host application
pub trait Surface: Send {
    /// Begin loading `url` and return immediately.
    ///
    /// Completion (or failure) is reported through `signal`; the renderer
    /// enforces the timeout.
    fn load(&mut self, url: &str, signal: LoadSignal) -> Result<()>;

    /// Called after the settle delay, right before capture.
    fn settle(&mut self) -> Result<()> {
        Ok(())
    }

    /// Capture the loaded content for printing. May block.
    fn capture(&mut self, setup: &PageSetup) -> Result<PrintArtifact>;

    /// Release the surface.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Creates rendering surfaces
pub trait SurfaceFactory: Send + Sync {
    /// A fresh, invisible surface sized for the paper.
    fn create(&self, options: &SurfaceOptions) -> Result<Box<dyn Surface>>;

    /// The host's primary view, for printing the page the user is looking at.
    ///
    /// The bridge only borrows this surface: it captures from it and drops the
    /// returned handle, but never calls [`Surface::close`] on it.
    fn primary_view(&self) -> Result<Box<dyn Surface>>;
}

/// Request to show the platform print dialog
#[derive(Debug, Clone)]
pub struct DialogRequest {
    pub job: JobId,
    /// Composed document; `None` means the primary view's current content
    pub document: Option<String>,
    pub setup: PageSetup,
    /// Device the dialog should preselect
    pub printer: Option<String>,
}

/// Host UI collaborator
pub trait HostUi: Send + Sync {
    /// Show the visible platform print dialog.
    fn present_dialog(&self, request: &DialogRequest) -> Result<()>;

    /// Non-blocking user notification.
    fn notify(&self, message: &str);
}

/// Surface factory for the enabled renderer backend.
///
/// Prefers the CDP backend when the `cdp` feature is enabled, otherwise the
/// pure-Rust headless renderer.
#[cfg(feature = "cdp")]
pub fn default_surfaces(_options: &BridgeOptions) -> Result<std::sync::Arc<dyn SurfaceFactory>> {
    Ok(std::sync::Arc::new(cdp::CdpSurfaceFactory::new()))
}

#[cfg(all(not(feature = "cdp"), feature = "headless"))]
pub fn default_surfaces(_options: &BridgeOptions) -> Result<std::sync::Arc<dyn SurfaceFactory>> {
    Ok(std::sync::Arc::new(headless::HeadlessSurfaceFactory::new()))
}

#[cfg(all(not(feature = "cdp"), not(feature = "headless")))]
pub fn default_surfaces(_options: &BridgeOptions) -> Result<std::sync::Arc<dyn SurfaceFactory>> {
    Err(Error::ConfigError(
        "no renderer backend enabled; build with the `headless` or `cdp` feature".into(),
    ))
}
