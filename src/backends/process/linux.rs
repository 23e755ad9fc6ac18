// Linux-specific process lookups using procfs
//
// procfs reports PermissionDenied and NotFound separately, which sysinfo
// folds together.

use super::{Lookup, ProcessIdentity};
use crate::process::Attr;
use procfs::ProcError;
use procfs::process::{FDTarget, Process};
use std::path::Path;

fn open(pid: u32) -> Result<Process, ProcError> {
    let raw = i32::try_from(pid).map_err(|_| ProcError::NotFound(None))?;
    Process::new(raw)
}

// The kernel truncates comm to this many bytes
const COMM_LEN: usize = 15;

/// Recover a name the kernel cut short from argv[0]
fn full_name(comm: String, cmdline: &[String]) -> String {
    if comm.len() < COMM_LEN {
        return comm;
    }
    cmdline
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|base| base.to_string_lossy().into_owned())
        .filter(|base| base.starts_with(&comm))
        .unwrap_or(comm)
}

pub fn identify(pid: u32) -> Lookup {
    let lookup = open(pid).and_then(|process| {
        let stat = process.stat()?;
        let cmdline = if stat.comm.len() < COMM_LEN {
            Vec::new()
        } else {
            process.cmdline().unwrap_or_default()
        };
        Ok(full_name(stat.comm, &cmdline))
    });

    match lookup {
        Ok(name) => Lookup::Found(ProcessIdentity { pid, name }),
        Err(ProcError::NotFound(_)) => Lookup::NotFound,
        Err(ProcError::PermissionDenied(_)) => Lookup::Denied,
        Err(e) => {
            log::debug!("Identity lookup for PID {} failed: {}", pid, e);
            if Path::new(&format!("/proc/{}", pid)).exists() {
                Lookup::Denied
            } else {
                Lookup::NotFound
            }
        }
    }
}

pub fn command_line(pid: u32) -> Attr<String> {
    open(pid)
        .and_then(|process| process.cmdline())
        .map(|args| args.join(" "))
        .into()
}

pub fn open_files(pid: u32) -> Attr<Vec<String>> {
    open(pid)
        .and_then(|process| process.fd())
        .map(|fds| {
            fds.flatten()
                .filter_map(|fd| match fd.target {
                    FDTarget::Path(path) => Some(path.display().to_string()),
                    _ => None,
                })
                .collect()
        })
        .into()
}
