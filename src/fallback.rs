//! Escalation after a failed silent print

use crate::job::JobState;
use crate::printers::{Device, Resolution};
use serde::Serialize;

/// The single escalation step taken for a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum FallbackAction {
    /// Dispatch the already rendered document once more on the system default
    RetryOnDefault { device: String },
    /// Hand the request to the visible platform print dialog
    ShowDialog,
}

/// Decides how a failed job escalates
///
/// Exactly one action is chosen per job. A retry is only worth it when the
/// failure came from a configured device and a different default exists;
/// everything else goes straight to the dialog.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    enabled: bool,
}

impl FallbackPolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether [`decide`](Self::decide) may need the current default device.
    pub fn wants_default(&self, resolution: Option<&Resolution>) -> bool {
        self.enabled && matches!(resolution, Some(Resolution::Configured(_)))
    }

    /// `default` is the system default device looked up after the failure.
    pub fn decide(
        &self,
        state: &JobState,
        resolution: Option<&Resolution>,
        default: Option<&Device>,
    ) -> Option<FallbackAction> {
        if !self.enabled {
            return None;
        }
        match state {
            JobState::Failed(reason) => {
                if reason.is_device_fault() {
                    if let (Some(Resolution::Configured(configured)), Some(default)) =
                        (resolution, default)
                    {
                        if default.name != configured.name {
                            return Some(FallbackAction::RetryOnDefault {
                                device: default.name.clone(),
                            });
                        }
                    }
                }
                Some(FallbackAction::ShowDialog)
            }
            JobState::TimedOut => Some(FallbackAction::ShowDialog),
            _ => None,
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::FailureReason;

    fn dispatch_failed() -> JobState {
        JobState::Failed(FailureReason::DispatchError("offline".into()))
    }

    #[test]
    fn configured_device_failure_retries_on_distinct_default() {
        let policy = FallbackPolicy::default();
        let configured = Resolution::Configured(Device::new("Kitchen", false));
        let default = Device::new("Front", true);
        assert_eq!(
            policy.decide(&dispatch_failed(), Some(&configured), Some(&default)),
            Some(FallbackAction::RetryOnDefault {
                device: "Front".into()
            })
        );
    }

    #[test]
    fn same_default_goes_to_dialog() {
        let policy = FallbackPolicy::default();
        let configured = Resolution::Configured(Device::new("Front", true));
        let default = Device::new("Front", true);
        assert_eq!(
            policy.decide(&dispatch_failed(), Some(&configured), Some(&default)),
            Some(FallbackAction::ShowDialog)
        );
    }

    #[test]
    fn default_device_failure_goes_to_dialog() {
        let policy = FallbackPolicy::default();
        let resolution = Resolution::SystemDefault(Device::new("Front", true));
        assert!(!policy.wants_default(Some(&resolution)));
        assert_eq!(
            policy.decide(&dispatch_failed(), Some(&resolution), None),
            Some(FallbackAction::ShowDialog)
        );
    }

    #[test]
    fn timeouts_and_render_errors_go_to_dialog() {
        let policy = FallbackPolicy::default();
        assert_eq!(
            policy.decide(&JobState::TimedOut, None, None),
            Some(FallbackAction::ShowDialog)
        );
        let render_failed = JobState::Failed(FailureReason::Unexpected("boom".into()));
        let configured = Resolution::Configured(Device::new("Kitchen", false));
        assert_eq!(
            policy.decide(
                &render_failed,
                Some(&configured),
                Some(&Device::new("Front", true))
            ),
            Some(FallbackAction::ShowDialog)
        );
    }

    #[test]
    fn disabled_policy_never_escalates() {
        let policy = FallbackPolicy::new(false);
        assert_eq!(policy.decide(&dispatch_failed(), None, None), None);
        assert_eq!(policy.decide(&JobState::Succeeded, None, None), None);
    }
}
