// Cross-platform connection enumeration backend system
//
// Each backend lists the sockets currently known to the kernel together with
// the pid that owns them (when the OS can attribute one):
// - Linux: procfs (/proc/net/tcp + /proc/<pid>/fd), lsof
// - macOS / BSD: lsof
// - Windows: netstat -ano

use super::{BackendCapabilities, BackendPriority};
use crate::error::EnumerationError;
use crate::port::{ConnectionState, Protocol};
use anyhow::Result;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A connection exactly as the OS reported it, before process resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawConnection {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: Option<SocketAddr>,
    pub state: ConnectionState,
    pub pid: Option<u32>,
}

/// Connection enumeration backend trait
///
/// Implementations must map OS failures into [`EnumerationError`]. Errors are
/// surfaced to the caller and never retried internally. No ordering is
/// promised.
pub trait ConnectionEnumerator: Send + Sync {
    /// Backend name (e.g., "procfs", "lsof", "netstat")
    fn name(&self) -> &'static str;

    /// Backend priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Check if this backend is available on the current system
    fn is_available() -> bool
    where
        Self: Sized;

    /// Get backend capabilities
    fn capabilities(&self) -> BackendCapabilities;

    /// List every current connection
    fn enumerate(&self) -> Result<Vec<RawConnection>, EnumerationError>;
}

/// Enumerator backend metadata for selection
#[derive(Debug, Clone)]
pub struct EnumeratorInfo {
    pub name: &'static str,
    pub priority: BackendPriority,
    pub available: bool,
}

#[cfg(target_os = "linux")]
mod procfs;
#[cfg(target_os = "linux")]
pub use self::procfs::ProcfsEnumerator;

#[cfg(unix)]
mod lsof;
#[cfg(unix)]
pub use lsof::LsofEnumerator;

#[cfg(any(windows, test))]
mod netstat;
#[cfg(windows)]
pub use netstat::NetstatEnumerator;

/// Detect all connection backends compiled for this platform
pub fn detect_enumerators() -> Vec<EnumeratorInfo> {
    let mut found = Vec::new();

    #[cfg(target_os = "linux")]
    found.push(EnumeratorInfo {
        name: "procfs",
        priority: BackendPriority::Best,
        available: ProcfsEnumerator::is_available(),
    });

    #[cfg(unix)]
    found.push(EnumeratorInfo {
        name: "lsof",
        priority: if cfg!(target_os = "linux") {
            BackendPriority::Good
        } else {
            BackendPriority::Best
        },
        available: LsofEnumerator::is_available(),
    });

    #[cfg(windows)]
    found.push(EnumeratorInfo {
        name: "netstat",
        priority: BackendPriority::Good,
        available: NetstatEnumerator::is_available(),
    });

    found
}

/// Select a connection backend
///
/// With a preference, that backend is constructed or an error returned.
/// Otherwise the highest-priority available backend wins.
pub fn select_enumerator(preference: Option<&str>) -> Result<Box<dyn ConnectionEnumerator>> {
    if let Some(name) = preference {
        return create_enumerator(name);
    }

    let mut candidates = detect_enumerators();
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

    match candidates.into_iter().find(|info| info.available) {
        Some(info) => create_enumerator(info.name),
        None => Err(anyhow::anyhow!(
            "No connection backends available on this platform"
        )),
    }
}

fn create_enumerator(name: &str) -> Result<Box<dyn ConnectionEnumerator>> {
    match name {
        #[cfg(target_os = "linux")]
        "procfs" => Ok(Box::new(ProcfsEnumerator::new()?)),
        #[cfg(unix)]
        "lsof" => Ok(Box::new(LsofEnumerator::new()?)),
        #[cfg(windows)]
        "netstat" => Ok(Box::new(NetstatEnumerator::new()?)),
        _ => Err(anyhow::anyhow!("Unknown connection backend: {}", name)),
    }
}

/// Drop the placeholder peer the OS reports for unconnected sockets
pub(crate) fn peer(addr: SocketAddr) -> Option<SocketAddr> {
    if addr.ip().is_unspecified() && addr.port() == 0 {
        None
    } else {
        Some(addr)
    }
}

/// Parse an `address:port` token from lsof or netstat output
///
/// Formats:
/// - "127.0.0.1:8080" (IPv4)
/// - "[::1]:8080", "[fe80::1%4]:123" (IPv6, zone index dropped)
/// - "*:8080" (wildcard; `ipv6` picks the unspecified address family)
/// - "*:*" yields `None`
pub(crate) fn parse_endpoint(token: &str, ipv6: bool) -> Option<SocketAddr> {
    let (host, port) = token.rsplit_once(':')?;
    if port == "*" {
        return None;
    }
    let port: u16 = port.parse().ok()?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = host.split('%').next().unwrap_or(host);

    let ip = if host == "*" {
        if ipv6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    } else {
        host.parse().ok()?
    };

    Some(SocketAddr::new(ip, port))
}
