//! Print job model and its state machine

use crate::config::{PaperFormat, Settings};
use crate::document;
use crate::fallback::FallbackAction;
use crate::normalize::normalize;
use crate::paper::PaperProfile;
use crate::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Opaque identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "print-job-{}", self.0)
    }
}

/// What a job prints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintSource {
    /// The primary view's current rendered state
    CurrentView,
    /// Markup extracted from the embedded content; normalized and composed
    /// into a paper-sized document before rendering
    Markup(String),
    /// A complete document that is rendered as-is (test prints)
    Document(String),
}

impl PrintSource {
    /// Blank or missing markup means "print the current view".
    pub fn from_html(html: Option<String>) -> Self {
        match html {
            Some(html) if !html.trim().is_empty() => PrintSource::Markup(html),
            _ => PrintSource::CurrentView,
        }
    }

    /// Document to render off-screen; `None` for the current view.
    pub fn render_document(&self, settings: &Settings, paper: &PaperProfile) -> Option<String> {
        match self {
            PrintSource::CurrentView => None,
            PrintSource::Markup(markup) => {
                let normalized = match settings.content_origin() {
                    Some(origin) => normalize(markup, &origin),
                    None => std::borrow::Cow::Borrowed(markup.as_str()),
                };
                Some(document::compose(&normalized, settings, paper))
            }
            PrintSource::Document(doc) => Some(doc.clone()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            PrintSource::CurrentView => "current view",
            PrintSource::Markup(_) => "extracted markup",
            PrintSource::Document(_) => "synthetic document",
        }
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    PrinterUnavailable(String),
    DispatchError(String),
    /// Anything else (render errors, settings failures, panics)
    Unexpected(String),
}

impl FailureReason {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::PrinterUnavailable(msg) => FailureReason::PrinterUnavailable(msg.clone()),
            Error::DispatchError(msg) => FailureReason::DispatchError(msg.clone()),
            other => FailureReason::Unexpected(other.to_string()),
        }
    }

    /// Failures the target device is responsible for.
    pub fn is_device_fault(&self) -> bool {
        matches!(
            self,
            FailureReason::PrinterUnavailable(_) | FailureReason::DispatchError(_)
        )
    }
}

/// Lifecycle state of a [`PrintJob`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Created,
    Resolving,
    Rendering,
    Dispatching,
    Succeeded,
    Failed(FailureReason),
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed(_) | JobState::TimedOut
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Resolving => "resolving",
            JobState::Rendering => "rendering",
            JobState::Dispatching => "dispatching",
            JobState::Succeeded => "succeeded",
            JobState::Failed(_) => "failed",
            JobState::TimedOut => "timed-out",
        }
    }
}

/// A single print request, owned by the dispatcher while it runs
#[derive(Debug)]
pub struct PrintJob {
    pub id: JobId,
    pub source: PrintSource,
    /// Paper format from the settings snapshot taken when the job starts
    pub paper_format: Option<PaperFormat>,
    pub resolved_printer: Option<String>,
    pub created_at: SystemTime,
    state: JobState,
    retried: bool,
}

impl PrintJob {
    pub fn new(source: PrintSource) -> Self {
        Self {
            id: JobId::new(),
            source,
            paper_format: None,
            resolved_printer: None,
            created_at: SystemTime::now(),
            state: JobState::Created,
            retried: false,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        use JobState::*;
        let allowed = match (&self.state, &next) {
            (Created, Resolving) => true,
            (Resolving, Rendering) => true,
            // only the fallback retry skips rendering (the document is still loaded)
            (Resolving, Dispatching) => self.retried,
            (Rendering, Dispatching) | (Rendering, TimedOut) => true,
            (Dispatching, Succeeded) => true,
            (from, Failed(_)) => !from.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(Error::Other(format!(
                "{}: invalid transition {} -> {}",
                self.id,
                self.state.label(),
                next.label()
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Re-enter `Resolving` after a failed dispatch. Allowed once per job.
    pub fn begin_retry(&mut self) -> Result<()> {
        if self.retried || !matches!(self.state, JobState::Failed(_)) {
            return Err(Error::Other(format!(
                "{}: retry not allowed from {}",
                self.id,
                self.state.label()
            )));
        }
        self.retried = true;
        self.state = JobState::Resolving;
        Ok(())
    }
}

/// How a request was ultimately completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Printed without a dialog on `printer`
    Silent { printer: String },
    /// Handed to the visible platform print dialog
    Dialog,
    /// Could not be printed; `message` was shown to the user
    Failed { message: String },
}

/// Final report for a print request
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub id: JobId,
    /// Terminal state of the silent attempt
    pub state: JobState,
    pub printer: Option<String>,
    /// Fallback escalation taken, if any
    pub fallback: Option<FallbackAction>,
    pub completion: Completion,
}

impl JobOutcome {
    /// True when the request reached a printer, silently or through the dialog.
    pub fn is_success(&self) -> bool {
        !matches!(self.completion, Completion::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("print-job-"));
    }

    #[test]
    fn blank_html_prints_current_view() {
        assert_eq!(PrintSource::from_html(None), PrintSource::CurrentView);
        assert_eq!(PrintSource::from_html(Some("  \n".into())), PrintSource::CurrentView);
        assert_eq!(
            PrintSource::from_html(Some("<p>Hi</p>".into())),
            PrintSource::Markup("<p>Hi</p>".into())
        );
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = PrintJob::new(PrintSource::CurrentView);
        job.transition(JobState::Resolving).unwrap();
        job.transition(JobState::Rendering).unwrap();
        job.transition(JobState::Dispatching).unwrap();
        job.transition(JobState::Succeeded).unwrap();
        assert!(job.state().is_terminal());
        assert!(job.transition(JobState::Failed(FailureReason::Unexpected("late".into()))).is_err());
    }

    #[test]
    fn rendering_cannot_be_skipped_without_retry() {
        let mut job = PrintJob::new(PrintSource::CurrentView);
        job.transition(JobState::Resolving).unwrap();
        assert!(job.transition(JobState::Dispatching).is_err());
        assert!(job.transition(JobState::TimedOut).is_err());
    }

    #[test]
    fn retry_is_allowed_once_after_failure() {
        let mut job = PrintJob::new(PrintSource::CurrentView);
        job.transition(JobState::Resolving).unwrap();
        job.transition(JobState::Rendering).unwrap();
        job.transition(JobState::Dispatching).unwrap();
        job.transition(JobState::Failed(FailureReason::DispatchError("jam".into())))
            .unwrap();

        job.begin_retry().unwrap();
        job.transition(JobState::Dispatching).unwrap();
        job.transition(JobState::Failed(FailureReason::DispatchError("jam".into())))
            .unwrap();
        assert!(job.begin_retry().is_err());
    }

    #[test]
    fn markup_is_normalized_against_home_origin() {
        let settings = Settings {
            home_url: Some("https://pos.example.com/app".into()),
            ..Default::default()
        };
        let paper = PaperProfile::for_format(PaperFormat::Thermal80);
        let doc = PrintSource::Markup(r#"<img src="/logo.png">"#.into())
            .render_document(&settings, &paper)
            .unwrap();
        assert!(doc.contains(r#"src="https://pos.example.com/logo.png""#));
        assert!(doc.contains("80mm"));
    }
}
