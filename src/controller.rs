// Process termination with confirmation and follow-up re-poll

use crate::backends::process::{Lookup, ProcessInspector};
use crate::backends::terminate::ProcessTerminator;
use crate::error::TerminateError;
use crate::scheduler::RepollRequester;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REPOLL_DELAY: Duration = Duration::from_millis(1000);

/// A resolved termination awaiting user confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTermination {
    pub pid: u32,
    pub name: String,
    pub force: bool,
}

impl PendingTermination {
    pub fn prompt(&self) -> String {
        let verb = if self.force {
            "Force kill"
        } else {
            "Terminate"
        };
        format!("{} process {} (PID {})?", verb, self.name, self.pid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateOutcome {
    Terminated { pid: u32, name: String },
    NotFound { pid: u32 },
    PermissionDenied { pid: u32, name: Option<String> },
    Failed { pid: u32, reason: String },
}

impl TerminateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminateOutcome::Terminated { .. })
    }
}

impl fmt::Display for TerminateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminateOutcome::Terminated { pid, name } => {
                write!(f, "Process {} (PID {}) terminated", name, pid)
            }
            TerminateOutcome::NotFound { pid } => write!(f, "Process {} no longer exists", pid),
            TerminateOutcome::PermissionDenied { pid, name: Some(name) } => write!(
                f,
                "Permission denied: cannot terminate {} (PID {})",
                name, pid
            ),
            TerminateOutcome::PermissionDenied { pid, name: None } => {
                write!(f, "Permission denied: cannot terminate PID {}", pid)
            }
            TerminateOutcome::Failed { pid, reason } => {
                write!(f, "Failed to terminate PID {}: {}", pid, reason)
            }
        }
    }
}

pub struct ProcessController {
    inspector: Arc<dyn ProcessInspector>,
    terminator: Arc<dyn ProcessTerminator>,
    repoll: Arc<dyn RepollRequester>,
    repoll_delay: Duration,
}

impl ProcessController {
    pub fn new(
        inspector: Arc<dyn ProcessInspector>,
        terminator: Arc<dyn ProcessTerminator>,
        repoll: Arc<dyn RepollRequester>,
        repoll_delay: Duration,
    ) -> Self {
        Self {
            inspector,
            terminator,
            repoll,
            repoll_delay,
        }
    }

    /// Look the pid up so the user can confirm by name
    pub fn resolve(&self, pid: u32, force: bool) -> Result<PendingTermination, TerminateOutcome> {
        match self.inspector.identify(pid) {
            Lookup::Found(identity) => Ok(PendingTermination {
                pid,
                name: identity.name,
                force,
            }),
            Lookup::NotFound => Err(TerminateOutcome::NotFound { pid }),
            Lookup::Denied => Err(TerminateOutcome::PermissionDenied { pid, name: None }),
        }
    }

    pub fn execute(&self, pending: PendingTermination) -> TerminateOutcome {
        let PendingTermination { pid, name, force } = pending;

        let outcome = match self.terminator.terminate(pid, force) {
            Ok(()) => TerminateOutcome::Terminated { pid, name },
            Err(TerminateError::NotFound(_)) => TerminateOutcome::NotFound { pid },
            Err(TerminateError::PermissionDenied(_)) => TerminateOutcome::PermissionDenied {
                pid,
                name: Some(name),
            },
            Err(e @ (TerminateError::Refused { .. } | TerminateError::Os { .. })) => {
                TerminateOutcome::Failed {
                    pid,
                    reason: e.to_string(),
                }
            }
        };

        if outcome.is_success() {
            log::info!("{}", outcome);
            self.repoll.request_repoll(self.repoll_delay);
        } else {
            log::warn!("{}", outcome);
        }
        outcome
    }

    /// Resolve and execute without asking
    pub fn terminate(&self, pid: u32, force: bool) -> TerminateOutcome {
        match self.resolve(pid, force) {
            Ok(pending) => self.execute(pending),
            Err(outcome) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeInspector, FakeTerminator, RecordingRepoll};

    struct Harness {
        controller: ProcessController,
        terminator: Arc<FakeTerminator>,
        repoll: Arc<RecordingRepoll>,
    }

    fn harness(inspector: FakeInspector, terminator: FakeTerminator) -> Harness {
        let terminator = Arc::new(terminator);
        let repoll = Arc::new(RecordingRepoll::default());
        let controller = ProcessController::new(
            Arc::new(inspector),
            terminator.clone(),
            repoll.clone(),
            DEFAULT_REPOLL_DELAY,
        );
        Harness {
            controller,
            terminator,
            repoll,
        }
    }

    #[test]
    fn test_prompt_text() {
        let pending = PendingTermination {
            pid: 42,
            name: "nginx".to_string(),
            force: false,
        };
        assert_eq!(pending.prompt(), "Terminate process nginx (PID 42)?");

        let forced = PendingTermination {
            force: true,
            ..pending
        };
        assert_eq!(forced.prompt(), "Force kill process nginx (PID 42)?");
    }

    #[test]
    fn test_resolve_found() {
        let h = harness(
            FakeInspector::new().named(42, "nginx"),
            FakeTerminator::succeeding(),
        );
        let pending = h.controller.resolve(42, true).unwrap();
        assert_eq!(pending.name, "nginx");
        assert!(pending.force);
        // Resolving alone never signals
        assert!(h.terminator.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_vanished_and_denied() {
        let h = harness(
            FakeInspector::new().with(1, Lookup::Denied),
            FakeTerminator::succeeding(),
        );
        assert_eq!(
            h.controller.resolve(99, false),
            Err(TerminateOutcome::NotFound { pid: 99 })
        );
        assert_eq!(
            h.controller.resolve(1, false),
            Err(TerminateOutcome::PermissionDenied { pid: 1, name: None })
        );
    }

    #[test]
    fn test_successful_kill_requests_one_repoll() {
        let h = harness(
            FakeInspector::new().named(42, "nginx"),
            FakeTerminator::succeeding(),
        );
        let outcome = h.controller.terminate(42, false);

        assert_eq!(
            outcome,
            TerminateOutcome::Terminated {
                pid: 42,
                name: "nginx".to_string()
            }
        );
        assert_eq!(*h.terminator.calls.lock().unwrap(), vec![(42, false)]);
        assert_eq!(*h.repoll.delays.lock().unwrap(), vec![DEFAULT_REPOLL_DELAY]);
    }

    #[test]
    fn test_force_flag_reaches_terminator() {
        let h = harness(
            FakeInspector::new().named(7, "stuck"),
            FakeTerminator::succeeding(),
        );
        h.controller.terminate(7, true);
        assert_eq!(*h.terminator.calls.lock().unwrap(), vec![(7, true)]);
    }

    #[test]
    fn test_process_gone_before_kill() {
        let h = harness(
            FakeInspector::new().named(42, "nginx"),
            FakeTerminator::failing(TerminateError::NotFound(42)),
        );
        let pending = h.controller.resolve(42, false).unwrap();
        assert_eq!(
            h.controller.execute(pending),
            TerminateOutcome::NotFound { pid: 42 }
        );
        assert!(h.repoll.delays.lock().unwrap().is_empty());
    }

    #[test]
    fn test_permission_denied_keeps_name() {
        let h = harness(
            FakeInspector::new().named(1, "systemd"),
            FakeTerminator::failing(TerminateError::PermissionDenied(1)),
        );
        let outcome = h.controller.terminate(1, true);
        assert_eq!(
            outcome.to_string(),
            "Permission denied: cannot terminate systemd (PID 1)"
        );
        assert!(h.repoll.delays.lock().unwrap().is_empty());
    }

    #[test]
    fn test_os_failure_is_reported() {
        let h = harness(
            FakeInspector::new().named(5, "svc"),
            FakeTerminator::failing(TerminateError::Os {
                pid: 5,
                reason: "EINVAL".to_string(),
            }),
        );
        match h.controller.terminate(5, false) {
            TerminateOutcome::Failed { pid, reason } => {
                assert_eq!(pid, 5);
                assert!(reason.contains("EINVAL"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_pid_is_never_signalled() {
        let h = harness(FakeInspector::new(), FakeTerminator::succeeding());
        assert_eq!(
            h.controller.terminate(404, true),
            TerminateOutcome::NotFound { pid: 404 }
        );
        assert!(h.terminator.calls.lock().unwrap().is_empty());
    }
}
