// Backend trait definitions and core types

pub mod connection;
pub mod process;
pub mod terminate;

/// Platform identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
    BSD,
}

impl Platform {
    pub fn current() -> Self {
        #[cfg(target_os = "linux")]
        return Platform::Linux;

        #[cfg(target_os = "macos")]
        return Platform::MacOS;

        #[cfg(target_os = "windows")]
        return Platform::Windows;

        #[cfg(any(target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
        return Platform::BSD;
    }

    /// What the operator needs to see every connection on this platform
    pub fn privilege_note(&self) -> &'static str {
        match self {
            Platform::Linux => {
                "Sockets of other users' processes are only attributed when running as root"
            }
            Platform::MacOS | Platform::BSD => {
                "lsof only lists other users' sockets when run with sudo"
            }
            Platform::Windows => {
                "Run from an elevated prompt to terminate system and service processes"
            }
        }
    }
}

/// Backend priority ranking (higher = better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendPriority {
    Fallback = 1, // Works but limited (text scraping of foreign tools)
    Good = 2,     // Solid implementation (lsof, netstat)
    Better = 3,   // Modern, efficient
    Best = 4,     // Native kernel interface (procfs)
}

/// Capabilities that a connection backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    pub ipv4_support: bool,
    pub ipv6_support: bool,
    pub udp_support: bool,
    /// Attributes sockets to pids without spawning another program
    pub native: bool,
}
