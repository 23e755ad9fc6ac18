// Process inspection for snapshot building and the detail view
//
// Identity lookups run once per unique pid per poll and must be cheap; the
// detail view is fetched on demand and may be slow. Both treat a vanished
// or protected process as an ordinary outcome.

use super::connection::ConnectionEnumerator;
use crate::port::UNKNOWN_PROCESS;
use crate::process::{Attr, ProcessDetail};
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sysinfo::{Pid, ProcessesToUpdate, System, Uid, Users};

#[cfg(target_os = "linux")]
mod linux;

/// Identity attributes needed to label a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub name: String,
}

/// Outcome of an identity lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ProcessIdentity),
    /// The process exited between enumeration and lookup
    NotFound,
    /// The OS refused access to the process attributes
    Denied,
}

impl Lookup {
    /// Name to display, with the sentinel for NotFound/Denied
    pub fn display_name(&self) -> String {
        match self {
            Lookup::Found(identity) => identity.name.clone(),
            Lookup::NotFound | Lookup::Denied => UNKNOWN_PROCESS.to_string(),
        }
    }
}

/// Platform-agnostic process inspection interface
pub trait ProcessInspector: Send + Sync {
    /// Called once at the start of every snapshot build
    fn begin_pass(&self) {}

    /// Resolve the identity of a pid
    fn identify(&self, pid: u32) -> Lookup;

    /// Fetch the detail view. `None` only when the process no longer exists;
    /// every other failure degrades a single field.
    fn describe(&self, pid: u32) -> Option<ProcessDetail>;
}

/// ProcessInspector backed by sysinfo, with procfs refinements on Linux
pub struct SystemInspector {
    // Cached System instance, refreshed per pass instead of rebuilt per lookup
    system: Mutex<System>,
    users: Mutex<Users>,
    enumerator: Arc<dyn ConnectionEnumerator>,
}

impl SystemInspector {
    pub fn new(enumerator: Arc<dyn ConnectionEnumerator>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            users: Mutex::new(Users::new_with_refreshed_list()),
            enumerator,
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn username(&self, uid: Option<Uid>) -> Attr<String> {
        let Some(uid) = uid else {
            return Attr::unavailable("owner not readable");
        };

        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.get_user_by_id(&uid).is_none() {
            // Accounts created since startup
            users.refresh_list();
        }
        match users.get_user_by_id(&uid) {
            Some(user) => Attr::Available(user.name().to_string()),
            None => Attr::unavailable("uid not in user database"),
        }
    }

    fn connections_of(&self, pid: u32) -> Attr<Vec<crate::backends::connection::RawConnection>> {
        self.enumerator
            .enumerate()
            .map(|all| all.into_iter().filter(|c| c.pid == Some(pid)).collect())
            .into()
    }
}

impl ProcessInspector for SystemInspector {
    #[cfg(not(target_os = "linux"))]
    fn begin_pass(&self) {
        self.system().refresh_processes(ProcessesToUpdate::All);
    }

    #[cfg(target_os = "linux")]
    fn identify(&self, pid: u32) -> Lookup {
        linux::identify(pid)
    }

    #[cfg(not(target_os = "linux"))]
    fn identify(&self, pid: u32) -> Lookup {
        let sys_pid = Pid::from_u32(pid);
        let mut sys = self.system();
        if sys.process(sys_pid).is_none() {
            // Started after this pass began
            sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]));
        }

        match sys.process(sys_pid) {
            None => Lookup::NotFound,
            Some(process) => {
                let name = process.name().to_string_lossy().into_owned();
                if name.is_empty() {
                    Lookup::Denied
                } else {
                    Lookup::Found(ProcessIdentity { pid, name })
                }
            }
        }
    }

    fn describe(&self, pid: u32) -> Option<ProcessDetail> {
        let sys_pid = Pid::from_u32(pid);

        // A targeted refresh never evicts dead pids, so a cached entry
        // alone proves nothing. Zero updated means the process is gone.
        let known = {
            let mut sys = self.system();
            let known = sys.process(sys_pid).is_some();
            if sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid])) == 0 {
                return None;
            }
            known
        };
        if !known {
            // CPU usage needs two samples. Unlocked while waiting.
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            if self
                .system()
                .refresh_processes(ProcessesToUpdate::Some(&[sys_pid]))
                == 0
            {
                return None;
            }
        }

        let sys = self.system();
        let process = sys.process(sys_pid)?;
        let name = process.name().to_string_lossy().into_owned();
        let status = process.status().to_string();
        let resident_memory = process.memory();
        let virtual_memory = process.virtual_memory();
        let cpu_percent = process.cpu_usage();
        let started_at = DateTime::from_timestamp(process.start_time() as i64, 0)
            .map(|t| t.with_timezone(&Local));
        let uid = process.user_id().cloned();
        #[cfg(not(target_os = "linux"))]
        let cmd: Vec<String> = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        drop(sys);

        #[cfg(target_os = "linux")]
        let (command_line, open_files) = (linux::command_line(pid), linux::open_files(pid));

        #[cfg(not(target_os = "linux"))]
        let (command_line, open_files) = {
            let command_line = if cmd.is_empty() {
                Attr::unavailable("not readable")
            } else {
                Attr::Available(cmd.join(" "))
            };
            (
                command_line,
                Attr::unavailable("not supported on this platform"),
            )
        };

        Some(ProcessDetail {
            pid,
            name,
            status,
            resident_memory,
            virtual_memory,
            cpu_percent,
            started_at,
            user: self.username(uid),
            command_line,
            open_files,
            connections: self.connections_of(pid),
        })
    }
}
