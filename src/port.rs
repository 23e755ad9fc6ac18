use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Sentinel used when the owning process could not be identified
pub const UNKNOWN_PROCESS: &str = "unknown process";

/// Transport protocol of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Protocol state of a connection as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    NewSynRecv,
    /// Connectionless socket (UDP)
    None,
    Unknown,
}

impl ConnectionState {
    /// Map a state token from netstat/lsof style output.
    ///
    /// Accepts both the BSD spelling (`LISTEN`, `SYN_RCVD`) and the Windows
    /// one (`LISTENING`, `SYN_RECEIVED`). Anything unrecognised is `Unknown`.
    pub fn from_token(token: &str) -> Self {
        let token = token.trim().trim_start_matches('(').trim_end_matches(')');
        match token.to_ascii_uppercase().as_str() {
            "ESTABLISHED" => ConnectionState::Established,
            "SYN_SENT" => ConnectionState::SynSent,
            "SYN_RECV" | "SYN_RCVD" | "SYN_RECEIVED" => ConnectionState::SynRecv,
            "FIN_WAIT1" | "FIN_WAIT_1" => ConnectionState::FinWait1,
            "FIN_WAIT2" | "FIN_WAIT_2" => ConnectionState::FinWait2,
            "TIME_WAIT" => ConnectionState::TimeWait,
            "CLOSE" | "CLOSED" => ConnectionState::Close,
            "CLOSE_WAIT" => ConnectionState::CloseWait,
            "LAST_ACK" => ConnectionState::LastAck,
            "LISTEN" | "LISTENING" => ConnectionState::Listen,
            "CLOSING" => ConnectionState::Closing,
            "NEW_SYN_RECV" => ConnectionState::NewSynRecv,
            "NONE" | "" => ConnectionState::None,
            _ => ConnectionState::Unknown,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynRecv => "SYN_RECV",
            ConnectionState::FinWait1 => "FIN_WAIT1",
            ConnectionState::FinWait2 => "FIN_WAIT2",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::Close => "CLOSE",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::NewSynRecv => "NEW_SYN_RECV",
            ConnectionState::None => "NONE",
            ConnectionState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One observed network connection plus its resolved owning process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub pid: u32,
    pub process_name: String,
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: Option<SocketAddr>,
    pub status: ConnectionState,
}

impl PortRecord {
    /// Identity within a single snapshot generation
    pub fn key(&self) -> (u32, SocketAddr, Option<SocketAddr>) {
        (self.pid, self.local, self.remote)
    }

    pub fn local_display(&self) -> String {
        self.local.to_string()
    }

    pub fn remote_display(&self) -> String {
        self.remote
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// One complete, atomically published set of port records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,
    pub captured_at: DateTime<Local>,
    pub records: Vec<PortRecord>,
}

impl Snapshot {
    pub fn new(generation: u64, records: Vec<PortRecord>) -> Self {
        Self {
            generation,
            captured_at: Local::now(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub type SharedSnapshot = Arc<Snapshot>;
