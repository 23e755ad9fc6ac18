// Linux procfs-based connection enumerator

use super::{ConnectionEnumerator, RawConnection, peer};
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::error::EnumerationError;
use crate::port::{ConnectionState, Protocol};
use anyhow::Result;
use procfs::ProcError;
use procfs::net::{TcpState, UdpState};
use procfs::process::{FDTarget, all_processes};
use std::collections::HashMap;

/// Connection enumerator using the Linux /proc filesystem
///
/// This backend reads socket information from:
/// - /proc/[pid]/fd/ - for socket inode ownership
/// - /proc/net/tcp, /proc/net/tcp6 - TCP sockets
/// - /proc/net/udp, /proc/net/udp6 - UDP sockets
///
/// Without root, descriptors of other users' processes cannot be read, so
/// their sockets come back with `pid: None`.
pub struct ProcfsEnumerator;

impl ProcfsEnumerator {
    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("procfs not available (is /proc mounted?)");
        }
        Ok(Self)
    }

    /// Socket inode -> owning pid, built by scanning every readable fd table
    fn socket_owners() -> Result<HashMap<u64, u32>, EnumerationError> {
        let mut owners = HashMap::new();
        let mut unreadable = 0usize;

        let processes = all_processes().map_err(|e| table_error("/proc", e))?;
        for proc_result in processes {
            let Ok(process) = proc_result else {
                continue;
            };
            let Ok(pid) = u32::try_from(process.pid()) else {
                continue;
            };

            match process.fd() {
                Ok(fds) => {
                    for fd_info in fds.flatten() {
                        if let FDTarget::Socket(inode) = fd_info.target {
                            owners.insert(inode, pid);
                        }
                    }
                }
                Err(_) => unreadable += 1,
            }
        }

        if unreadable > 0 {
            log::debug!(
                "Could not read fd table of {} process(es); their sockets stay unattributed",
                unreadable
            );
        }

        Ok(owners)
    }
}

impl ConnectionEnumerator for ProcfsEnumerator {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Best
    }

    fn is_available() -> bool {
        std::path::Path::new("/proc/net/tcp").exists()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ipv4_support: true,
            ipv6_support: true,
            udp_support: true,
            native: true,
        }
    }

    fn enumerate(&self) -> Result<Vec<RawConnection>, EnumerationError> {
        let owners = Self::socket_owners()?;
        let owner = |inode: u64| {
            if inode == 0 {
                None
            } else {
                owners.get(&inode).copied()
            }
        };

        let tcp = procfs::net::tcp().map_err(|e| table_error("/proc/net/tcp", e))?;
        let tcp6 = optional_table(procfs::net::tcp6(), "/proc/net/tcp6")?;
        let udp = procfs::net::udp().map_err(|e| table_error("/proc/net/udp", e))?;
        let udp6 = optional_table(procfs::net::udp6(), "/proc/net/udp6")?;

        let mut connections = Vec::with_capacity(tcp.len() + tcp6.len() + udp.len() + udp6.len());

        for entry in tcp.into_iter().chain(tcp6) {
            connections.push(RawConnection {
                protocol: Protocol::Tcp,
                local: entry.local_address,
                remote: peer(entry.remote_address),
                state: tcp_state(&entry.state),
                pid: owner(entry.inode),
            });
        }

        for entry in udp.into_iter().chain(udp6) {
            connections.push(RawConnection {
                protocol: Protocol::Udp,
                local: entry.local_address,
                remote: peer(entry.remote_address),
                state: udp_state(&entry.state),
                pid: owner(entry.inode),
            });
        }

        Ok(connections)
    }
}

/// IPv6 tables vanish when IPv6 is disabled; that is an empty table
fn optional_table<T>(
    result: procfs::ProcResult<Vec<T>>,
    table: &str,
) -> Result<Vec<T>, EnumerationError> {
    match result {
        Ok(entries) => Ok(entries),
        Err(ProcError::NotFound(_)) => {
            log::debug!("{} not present, treating as empty", table);
            Ok(Vec::new())
        }
        Err(e) => Err(table_error(table, e)),
    }
}

fn table_error(table: &str, err: ProcError) -> EnumerationError {
    match err {
        ProcError::PermissionDenied(_) => EnumerationError::PermissionDenied(table.to_string()),
        other => EnumerationError::Unavailable(format!("{}: {}", table, other)),
    }
}

fn tcp_state(state: &TcpState) -> ConnectionState {
    #[allow(unreachable_patterns)]
    match state {
        TcpState::Established => ConnectionState::Established,
        TcpState::SynSent => ConnectionState::SynSent,
        TcpState::SynRecv => ConnectionState::SynRecv,
        TcpState::FinWait1 => ConnectionState::FinWait1,
        TcpState::FinWait2 => ConnectionState::FinWait2,
        TcpState::TimeWait => ConnectionState::TimeWait,
        TcpState::Close => ConnectionState::Close,
        TcpState::CloseWait => ConnectionState::CloseWait,
        TcpState::LastAck => ConnectionState::LastAck,
        TcpState::Listen => ConnectionState::Listen,
        TcpState::Closing => ConnectionState::Closing,
        TcpState::NewSynRecv => ConnectionState::NewSynRecv,
        _ => ConnectionState::Unknown,
    }
}

// UDP has no protocol state; the kernel's "established" only means connect()ed
fn udp_state(_state: &UdpState) -> ConnectionState {
    ConnectionState::None
}
