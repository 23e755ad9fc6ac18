// Process termination primitive
//
// Unix delivers SIGTERM (graceful) or SIGKILL (forced) through nix.
// Elsewhere sysinfo is used; on Windows a graceful request falls back to
// TerminateProcess because console-less processes cannot receive one.

use crate::error::TerminateError;

/// OS primitive for stopping a process
pub trait ProcessTerminator: Send + Sync {
    fn terminate(&self, pid: u32, force: bool) -> Result<(), TerminateError>;
}

/// Signal-based terminator for the current platform
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

impl SignalTerminator {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl ProcessTerminator for SignalTerminator {
    fn terminate(&self, pid: u32, force: bool) -> Result<(), TerminateError> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        // kill(0) and negative pids address process groups
        let raw = match i32::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => {
                return Err(TerminateError::Refused {
                    pid,
                    reason: "not a single-process pid".to_string(),
                });
            }
        };

        let signal = if force {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        log::info!("Sending {:?} to PID {}", signal, pid);

        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(TerminateError::NotFound(pid)),
            Err(Errno::EPERM) => Err(TerminateError::PermissionDenied(pid)),
            Err(e) => Err(TerminateError::Os {
                pid,
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(not(unix))]
impl ProcessTerminator for SignalTerminator {
    fn terminate(&self, pid: u32, force: bool) -> Result<(), TerminateError> {
        use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

        if pid == 0 {
            return Err(TerminateError::Refused {
                pid,
                reason: "System Idle Process".to_string(),
            });
        }

        let sys_pid = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]));
        let Some(process) = sys.process(sys_pid) else {
            return Err(TerminateError::NotFound(pid));
        };

        log::info!(
            "Terminating PID {} ({})",
            pid,
            if force { "forced" } else { "graceful" }
        );

        let delivered = if force {
            process.kill()
        } else {
            process
                .kill_with(Signal::Term)
                .unwrap_or_else(|| process.kill())
        };

        if delivered {
            Ok(())
        } else {
            // The OS reports no reason; a process that is still listed was refused
            Err(TerminateError::PermissionDenied(pid))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_refuses_pid_zero() {
        let result = SignalTerminator::new().terminate(0, false);
        assert!(matches!(result, Err(TerminateError::Refused { .. })));
    }

    #[test]
    fn test_refuses_pid_outside_pid_t() {
        let result = SignalTerminator::new().terminate(u32::MAX, true);
        assert!(matches!(result, Err(TerminateError::Refused { .. })));
    }

    #[test]
    fn test_terminates_child_then_reports_not_found() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();

        SignalTerminator::new().terminate(pid, false).unwrap();
        child.wait().unwrap();

        assert_eq!(
            SignalTerminator::new().terminate(pid, true),
            Err(TerminateError::NotFound(pid))
        );
    }
}
