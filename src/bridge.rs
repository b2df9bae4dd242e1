//! Host-facing bridge with a serialized job queue
//!
//! A single worker task owns the [`Dispatcher`] and runs print jobs one at a
//! time in submission order, so two requests can never interleave their
//! resolution, rendering or dispatch. Callers get a [`JobTicket`] back
//! immediately and may await the outcome or drop the ticket.

use crate::config::{Settings, SettingsPatch, SettingsStore};
use crate::dispatch::{Dispatcher, StateObserver};
use crate::document;
use crate::interceptor::{self, PrintRequest};
use crate::job::{JobId, JobOutcome, PrintJob, PrintSource};
use crate::normalize::normalize;
use crate::paper::PaperProfile;
use crate::printers::{Device, PrinterResolver};
use crate::spooler::Spooler;
use crate::{BridgeOptions, Error, HostUi, Result, SurfaceFactory};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum Command {
    Print(PrintJob, oneshot::Sender<JobOutcome>),
    Shutdown(oneshot::Sender<()>),
}

/// Collaborators and options for [`PrintBridge::new`]
pub struct BridgeParts {
    pub settings: Arc<dyn SettingsStore>,
    pub spooler: Arc<dyn Spooler>,
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub ui: Arc<dyn HostUi>,
    pub options: BridgeOptions,
    /// Sees every job state transition
    pub observer: Option<StateObserver>,
}

/// Handle for a queued print job
#[derive(Debug)]
pub struct JobTicket {
    pub id: JobId,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobTicket {
    /// Wait for the job to finish.
    pub async fn outcome(self) -> Result<JobOutcome> {
        self.rx
            .await
            .map_err(|_| Error::Other(format!("bridge stopped before {} finished", self.id)))
    }
}

/// The native side of the print bridge
#[derive(Clone)]
pub struct PrintBridge {
    cmd_tx: mpsc::UnboundedSender<Command>,
    settings: Arc<dyn SettingsStore>,
    resolver: PrinterResolver,
    options: Arc<BridgeOptions>,
}

impl PrintBridge {
    /// Create the bridge and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(parts: BridgeParts) -> Self {
        let BridgeParts {
            settings,
            spooler,
            surfaces,
            ui,
            options,
            observer,
        } = parts;

        let dispatcher = Dispatcher::new(Arc::clone(&spooler), surfaces, ui, &options, observer);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(dispatcher, Arc::clone(&settings), cmd_rx));

        Self {
            cmd_tx,
            settings,
            resolver: PrinterResolver::new(spooler),
            options: Arc::new(options),
        }
    }

    /// Interception script to inject into every document of the embedded view.
    pub fn interceptor_script(&self) -> String {
        interceptor::script(&self.options.interceptor)
    }

    /// Handle a message posted by the interception script.
    pub fn handle_message(&self, raw: &str) -> Result<JobTicket> {
        let request = PrintRequest::from_message(raw).map_err(|e| {
            log::warn!("dropping message from embedded content: {}", e);
            e
        })?;
        self.submit(request.into_source())
    }

    /// Queue a print job.
    pub fn submit(&self, source: PrintSource) -> Result<JobTicket> {
        let job = PrintJob::new(source);
        let id = job.id;
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Print(job, tx))
            .map_err(|_| Error::Other("print bridge has shut down".into()))?;
        log::debug!("{} queued", id);
        Ok(JobTicket { id, rx })
    }

    /// Print extracted markup, or the current view when `html` is blank.
    pub async fn print(&self, html: Option<String>) -> Result<JobOutcome> {
        self.submit(PrintSource::from_html(html))?.outcome().await
    }

    /// Print whatever the primary view currently shows.
    pub async fn print_current_page(&self) -> Result<JobOutcome> {
        self.submit(PrintSource::CurrentView)?.outcome().await
    }

    /// Print the diagnostic test page on the configured printer.
    pub async fn test_print(&self) -> Result<JobOutcome> {
        let settings = self.settings.load()?;
        let paper = PaperProfile::for_format(settings.printer.paper_format);
        let page = document::test_document(&settings, &paper, settings.printer.configured_printer());
        self.submit(PrintSource::Document(page))?.outcome().await
    }

    pub fn get_settings(&self) -> Result<Settings> {
        self.settings.load()
    }

    /// Apply a partial settings update; later jobs see the new values.
    pub fn save_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let settings = self.settings.update(patch)?;
        log::info!(
            "settings saved (printer {:?}, paper {})",
            settings.printer.printer_name,
            settings.printer.paper_format
        );
        Ok(settings)
    }

    /// Installed printers, fetched fresh. Blocks on the spooler.
    pub fn list_printers(&self) -> Result<Vec<Device>> {
        self.resolver.devices()
    }

    /// Preview page for `html` with the current paper settings.
    pub fn preview(&self, html: &str) -> Result<String> {
        let settings = self.settings.load()?;
        let paper = PaperProfile::for_format(settings.printer.paper_format);
        let markup = match settings.content_origin() {
            Some(origin) => normalize(html, &origin),
            None => std::borrow::Cow::Borrowed(html),
        };
        Ok(document::preview_document(&markup, &settings, &paper))
    }

    /// Remember the primary view's location so the next launch can restore it.
    ///
    /// Temporary print documents and in-memory pages are ignored. Returns
    /// whether the URL was stored.
    pub fn record_navigation(&self, url: &str) -> Result<bool> {
        let url = url.trim();
        let scheme = url.split(':').next().unwrap_or("").to_ascii_lowercase();
        if url.is_empty() || matches!(scheme.as_str(), "file" | "data" | "about" | "blob") {
            return Ok(false);
        }
        if self.settings.load()?.last_visited_url.as_deref() == Some(url) {
            return Ok(false);
        }
        self.settings.update(SettingsPatch {
            last_visited_url: Some(url.to_string()),
            ..Default::default()
        })?;
        Ok(true)
    }

    /// Stop the worker after the jobs already queued have finished.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown(tx)).is_err() {
            return Ok(());
        }
        rx.await
            .map_err(|_| Error::Other("print bridge worker exited unexpectedly".into()))
    }
}

async fn run_queue(
    dispatcher: Dispatcher,
    settings: Arc<dyn SettingsStore>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Print(job, reply) => {
                // one snapshot per job: edits made while it runs apply to the next one
                let outcome = match settings.load() {
                    Ok(snapshot) => dispatcher.run(job, &snapshot).await,
                    Err(e) => dispatcher.reject(job, e),
                };
                let _ = reply.send(outcome);
            }
            Command::Shutdown(done) => {
                let _ = done.send(());
                break;
            }
        }
    }
    log::debug!("print bridge worker stopped");
}
