// lsof-based connection enumerator (macOS, BSD, Linux fallback)

use super::{ConnectionEnumerator, RawConnection, parse_endpoint, peer};
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::error::EnumerationError;
use crate::port::{ConnectionState, Protocol};
use anyhow::Result;
use std::process::Command;

const LSOF_ARGS: [&str; 5] = ["-n", "-P", "-i", "-F", "pftPnT"];

/// Connection enumerator using the lsof command
///
/// Runs `lsof -n -P -i -F pftPnT` and parses the field output. Without
/// root, lsof only reports the caller's own processes.
pub struct LsofEnumerator;

impl LsofEnumerator {
    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("lsof command not found");
        }
        Ok(Self)
    }

    /// Parse lsof -F output format
    ///
    /// Format (one field per line, process sets then file sets):
    /// p1234                               <- PID
    /// f12                                 <- file descriptor, starts a file set
    /// tIPv4                               <- address family
    /// PTCP                                <- protocol
    /// n127.0.0.1:8080->93.184.216.34:80   <- addresses
    /// TST=ESTABLISHED                     <- TCP state
    pub fn parse_output(output: &str) -> Vec<RawConnection> {
        let mut connections = Vec::new();
        let mut current_pid: Option<u32> = None;
        let mut file: Option<FileSet> = None;

        for line in output.lines() {
            let mut chars = line.chars();
            let Some(marker) = chars.next() else {
                continue;
            };
            let value = chars.as_str();

            match marker {
                'p' => {
                    flush(&mut file, current_pid, &mut connections);
                    current_pid = value.parse().ok();
                }
                'f' => {
                    flush(&mut file, current_pid, &mut connections);
                    file = Some(FileSet::default());
                }
                't' => {
                    if let Some(f) = file.as_mut() {
                        f.ipv6 = value == "IPv6";
                    }
                }
                'P' => {
                    if let Some(f) = file.as_mut() {
                        f.protocol = match value {
                            "TCP" => Some(Protocol::Tcp),
                            "UDP" => Some(Protocol::Udp),
                            _ => None,
                        };
                    }
                }
                'n' => {
                    if let Some(f) = file.as_mut() {
                        f.name = Some(value.to_string());
                    }
                }
                'T' => {
                    if let (Some(f), Some(state)) = (file.as_mut(), value.strip_prefix("ST=")) {
                        f.state = Some(ConnectionState::from_token(state));
                    }
                }
                _ => {
                    // Ignore other markers (c for command, TQR/TQS queue sizes, ...)
                }
            }
        }
        flush(&mut file, current_pid, &mut connections);

        connections
    }
}

#[derive(Debug, Default)]
struct FileSet {
    ipv6: bool,
    protocol: Option<Protocol>,
    name: Option<String>,
    state: Option<ConnectionState>,
}

fn flush(file: &mut Option<FileSet>, pid: Option<u32>, out: &mut Vec<RawConnection>) {
    let Some(f) = file.take() else {
        return;
    };
    let (Some(protocol), Some(name)) = (f.protocol, f.name) else {
        return;
    };

    let mut parts = name.split("->");
    let local_token = parts.next().unwrap_or_default();
    let Some(local) = parse_endpoint(local_token, f.ipv6) else {
        log::debug!("Failed to parse lsof local address '{}'", local_token);
        return;
    };
    let remote = parts
        .next()
        .and_then(|token| parse_endpoint(token, f.ipv6))
        .and_then(peer);

    let state = match protocol {
        Protocol::Tcp => f.state.unwrap_or(ConnectionState::Unknown),
        Protocol::Udp => ConnectionState::None,
    };

    out.push(RawConnection {
        protocol,
        local,
        remote,
        state,
        pid,
    });
}

impl ConnectionEnumerator for LsofEnumerator {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn priority(&self) -> BackendPriority {
        // Spawns an external process; only procfs beats it
        if cfg!(target_os = "linux") {
            BackendPriority::Good
        } else {
            BackendPriority::Best
        }
    }

    fn is_available() -> bool {
        Command::new("which")
            .arg("lsof")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ipv4_support: true,
            ipv6_support: true,
            udp_support: true,
            native: false,
        }
    }

    fn enumerate(&self) -> Result<Vec<RawConnection>, EnumerationError> {
        let output = Command::new("lsof")
            .args(LSOF_ARGS)
            .output()
            .map_err(|e| EnumerationError::Command {
                command: "lsof".to_string(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        // lsof exits 1 when nothing matched, which is not a failure
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.trim().is_empty() {
                return Ok(Vec::new());
            }
            return Err(EnumerationError::Command {
                command: "lsof".to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        Ok(Self::parse_output(&stdout))
    }
}
