//! Print job dispatcher
//!
//! Drives one [`PrintJob`] through its states:
//!
//! ```text
//! Created -> Resolving -> Rendering -> Dispatching -> Succeeded
//!                            |             |
//!                            v             v
//!                        TimedOut    Failed(reason)
//! ```
//!
//! A failed or timed out job escalates exactly once through the
//! [`FallbackPolicy`]. Rendering resources are always released before the
//! job reports its outcome; the dialog fallback runs after that release.

use crate::config::Settings;
use crate::fallback::{FallbackAction, FallbackPolicy};
use crate::job::{Completion, FailureReason, JobId, JobOutcome, JobState, PrintJob};
use crate::paper::PageSetup;
use crate::printers::{Device, PrinterResolver, Resolution};
use crate::render::{OffscreenRenderer, RenderedDocument};
use crate::spooler::Spooler;
use crate::{BridgeOptions, DialogRequest, Error, HostUi, Result, SurfaceFactory};
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked on every job state transition
pub type StateObserver = Arc<dyn Fn(JobId, &JobState) + Send + Sync>;

/// Why the silent attempt stopped, with whatever it still holds
struct Failure {
    error: Error,
    resolution: Option<Resolution>,
    rendered: Option<RenderedDocument>,
    /// False once the visible dialog itself has failed
    escalate: bool,
}

impl Failure {
    fn new(error: Error, resolution: Option<Resolution>, rendered: Option<RenderedDocument>) -> Self {
        Self {
            error,
            resolution,
            rendered,
            escalate: true,
        }
    }
}

fn release(rendered: Option<RenderedDocument>) {
    if let Some(rendered) = rendered {
        rendered.release();
    }
}

/// Runs print jobs against a spooler, a surface factory and the host UI
pub struct Dispatcher {
    resolver: PrinterResolver,
    spooler: Arc<dyn Spooler>,
    renderer: OffscreenRenderer,
    ui: Arc<dyn HostUi>,
    policy: FallbackPolicy,
    settle_delay: Duration,
    observer: Option<StateObserver>,
}

impl Dispatcher {
    pub fn new(
        spooler: Arc<dyn Spooler>,
        surfaces: Arc<dyn SurfaceFactory>,
        ui: Arc<dyn HostUi>,
        options: &BridgeOptions,
        observer: Option<StateObserver>,
    ) -> Self {
        Self {
            resolver: PrinterResolver::new(Arc::clone(&spooler)),
            renderer: OffscreenRenderer::new(
                surfaces,
                Duration::from_millis(options.render_timeout_ms),
                options.temp_dir.clone(),
            ),
            spooler,
            ui,
            policy: FallbackPolicy::new(options.fallback_enabled),
            settle_delay: Duration::from_millis(options.settle_delay_ms),
            observer,
        }
    }

    /// Run `job` to completion with the given settings snapshot.
    pub async fn run(&self, mut job: PrintJob, settings: &Settings) -> JobOutcome {
        job.paper_format = Some(settings.printer.paper_format);
        let setup = PageSetup::from_config(&settings.printer, format!("printbridge {}", job.id));
        let document = job.source.render_document(settings, &setup.paper);
        log::info!(
            "{}: printing {} on {} paper",
            job.id,
            job.source.describe(),
            setup.paper.format
        );

        let (completion, fallback) = match self
            .attempt(&mut job, settings, document.as_deref(), &setup)
            .await
        {
            Ok(completion) => (completion, None),
            Err(failure) => self.escalate(&mut job, failure, document, &setup).await,
        };

        match &completion {
            Completion::Silent { printer } => log::info!("{}: printed on {}", job.id, printer),
            Completion::Dialog => log::info!("{}: handed to the print dialog", job.id),
            Completion::Failed { message } => log::error!("{}: {}", job.id, message),
        }

        JobOutcome {
            id: job.id,
            state: job.state().clone(),
            printer: job.resolved_printer.clone(),
            fallback,
            completion,
        }
    }

    /// Fail a job that could not be started (e.g. unreadable settings).
    pub fn reject(&self, mut job: PrintJob, error: Error) -> JobOutcome {
        self.advance(&mut job, JobState::Failed(FailureReason::from_error(&error)));
        let completion = self.surface_failure(&job, &error);
        JobOutcome {
            id: job.id,
            state: job.state().clone(),
            printer: None,
            fallback: None,
            completion,
        }
    }

    fn advance(&self, job: &mut PrintJob, next: JobState) {
        if let Err(e) = job.transition(next) {
            log::error!("{}", e);
            return;
        }
        log::debug!("{}: {}", job.id, job.state().label());
        if let Some(observer) = &self.observer {
            observer(job.id, job.state());
        }
    }

    /// Silent path: resolve, render, settle, dispatch.
    async fn attempt(
        &self,
        job: &mut PrintJob,
        settings: &Settings,
        document: Option<&str>,
        setup: &PageSetup,
    ) -> std::result::Result<Completion, Failure> {
        self.advance(job, JobState::Resolving);
        let resolution = match self.resolve(settings.printer.configured_printer()).await {
            Ok(resolution) => resolution,
            Err(e) => {
                self.advance(job, JobState::Failed(FailureReason::from_error(&e)));
                return Err(Failure::new(e, None, None));
            }
        };
        job.resolved_printer = resolution.device_name().map(str::to_string);
        if let Resolution::SystemDefault(device) = &resolution {
            if let Some(configured) = settings.printer.configured_printer() {
                log::warn!(
                    "{}: printer '{}' not installed, using default '{}'",
                    job.id,
                    configured,
                    device.name
                );
            }
        }

        self.advance(job, JobState::Rendering);
        let mut rendered = match self.renderer.render(document, &setup.paper).await {
            Ok(rendered) => rendered,
            Err(e) => {
                let next = match e {
                    Error::RenderTimeout(_) => JobState::TimedOut,
                    _ => JobState::Failed(FailureReason::from_error(&e)),
                };
                self.advance(job, next);
                return Err(Failure::new(e, Some(resolution), None));
            }
        };

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        if let Err(e) = rendered.settle() {
            log::debug!("{}: settle failed: {}", job.id, e);
        }

        self.advance(job, JobState::Dispatching);

        if !settings.printer.silent {
            rendered.release();
            let request = DialogRequest {
                job: job.id,
                document: document.map(str::to_string),
                setup: setup.clone(),
                printer: job.resolved_printer.clone(),
            };
            return match self.ui.present_dialog(&request) {
                Ok(()) => {
                    self.advance(job, JobState::Succeeded);
                    Ok(Completion::Dialog)
                }
                Err(e) => {
                    self.advance(job, JobState::Failed(FailureReason::from_error(&e)));
                    Err(Failure {
                        escalate: false,
                        ..Failure::new(e, None, None)
                    })
                }
            };
        }

        let Some(device) = resolution.device().map(|d| d.name.clone()) else {
            let e = Error::PrinterUnavailable("no printers are installed".into());
            self.advance(job, JobState::Failed(FailureReason::from_error(&e)));
            return Err(Failure::new(e, Some(resolution), Some(rendered)));
        };

        let (rendered, result) = self.dispatch(rendered, &device, setup).await;
        match result {
            Ok(()) => {
                release(rendered);
                self.advance(job, JobState::Succeeded);
                Ok(Completion::Silent { printer: device })
            }
            Err(e) => {
                log::warn!("{}: dispatch to {} failed: {}", job.id, device, e);
                self.advance(job, JobState::Failed(FailureReason::from_error(&e)));
                Err(Failure::new(e, Some(resolution), rendered))
            }
        }
    }

    /// Take the single fallback step for a failed job.
    async fn escalate(
        &self,
        job: &mut PrintJob,
        failure: Failure,
        document: Option<String>,
        setup: &PageSetup,
    ) -> (Completion, Option<FallbackAction>) {
        let Failure {
            error,
            resolution,
            rendered,
            escalate,
        } = failure;

        if !escalate {
            release(rendered);
            return (self.surface_failure(job, &error), None);
        }

        let default = if self.policy.wants_default(resolution.as_ref()) {
            self.default_device().await
        } else {
            None
        };
        let action = self
            .policy
            .decide(job.state(), resolution.as_ref(), default.as_ref());
        log::info!("{}: fallback {:?}", job.id, action);

        match (action, rendered) {
            (Some(FallbackAction::RetryOnDefault { device }), Some(rendered)) => {
                let completion = self.retry(job, rendered, &device, setup).await;
                (completion, Some(FallbackAction::RetryOnDefault { device }))
            }
            (Some(_), rendered) => {
                release(rendered);
                let completion = self.show_dialog(job, document, setup, &error);
                (completion, Some(FallbackAction::ShowDialog))
            }
            (None, rendered) => {
                release(rendered);
                (self.surface_failure(job, &error), None)
            }
        }
    }

    fn show_dialog(
        &self,
        job: &PrintJob,
        document: Option<String>,
        setup: &PageSetup,
        cause: &Error,
    ) -> Completion {
        let request = DialogRequest {
            job: job.id,
            document,
            setup: setup.clone(),
            printer: job.resolved_printer.clone(),
        };
        match self.ui.present_dialog(&request) {
            Ok(()) => Completion::Dialog,
            Err(e) => {
                log::warn!("{}: print dialog failed: {}", job.id, e);
                self.surface_failure(job, cause)
            }
        }
    }

    async fn retry(
        &self,
        job: &mut PrintJob,
        rendered: RenderedDocument,
        device: &str,
        setup: &PageSetup,
    ) -> Completion {
        if let Err(e) = job.begin_retry() {
            log::error!("{}", e);
            rendered.release();
            return self.surface_failure(job, &e);
        }
        if let Some(observer) = &self.observer {
            observer(job.id, job.state());
        }
        job.resolved_printer = Some(device.to_string());
        self.advance(job, JobState::Dispatching);

        let (rendered, result) = self.dispatch(rendered, device, setup).await;
        release(rendered);
        match result {
            Ok(()) => {
                self.advance(job, JobState::Succeeded);
                Completion::Silent {
                    printer: device.to_string(),
                }
            }
            Err(e) => {
                self.advance(job, JobState::Failed(FailureReason::from_error(&e)));
                self.surface_failure(job, &e)
            }
        }
    }

    /// Capture and submit on the blocking pool; hands the document back for
    /// release or a retry.
    async fn dispatch(
        &self,
        mut rendered: RenderedDocument,
        device: &str,
        setup: &PageSetup,
    ) -> (Option<RenderedDocument>, Result<()>) {
        let spooler = Arc::clone(&self.spooler);
        let device = device.to_string();
        let setup = setup.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = rendered.capture(&setup).and_then(|artifact| {
                log::debug!(
                    "submitting {} bytes ({}) to {}",
                    artifact.data.len(),
                    artifact.kind.mime_type(),
                    device
                );
                spooler.submit(&device, &artifact, &setup)
            });
            (rendered, result)
        })
        .await;
        match joined {
            Ok((rendered, result)) => (Some(rendered), result),
            Err(e) => (
                None,
                Err(Error::DispatchError(format!("print task failed: {}", e))),
            ),
        }
    }

    async fn resolve(&self, configured: Option<&str>) -> Result<Resolution> {
        let resolver = self.resolver.clone();
        let configured = configured.map(str::to_string);
        tokio::task::spawn_blocking(move || resolver.resolve(configured.as_deref()))
            .await
            .map_err(|e| Error::Other(format!("printer lookup task failed: {}", e)))?
    }

    async fn default_device(&self) -> Option<Device> {
        let resolver = self.resolver.clone();
        match tokio::task::spawn_blocking(move || resolver.default_device()).await {
            Ok(Ok(device)) => device,
            Ok(Err(e)) => {
                log::warn!("default printer lookup failed: {}", e);
                None
            }
            Err(e) => {
                log::warn!("default printer lookup task failed: {}", e);
                None
            }
        }
    }

    /// Report an unrecoverable failure to the user once.
    fn surface_failure(&self, job: &PrintJob, error: &Error) -> Completion {
        let message = format!("Printing failed: {}", error.user_hint());
        log::debug!("{}: notifying user: {}", job.id, error);
        self.ui.notify(&message);
        Completion::Failed { message }
    }
}
