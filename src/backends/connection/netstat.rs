// Windows netstat-based connection enumerator

use super::{ConnectionEnumerator, RawConnection, parse_endpoint, peer};
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::error::EnumerationError;
use crate::port::{ConnectionState, Protocol};
use anyhow::Result;
use std::process::Command;

/// Connection enumerator using `netstat -ano`
///
/// PID 0 (System Idle Process) owns TIME_WAIT leftovers and is reported as
/// having no owner.
pub struct NetstatEnumerator;

impl NetstatEnumerator {
    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            anyhow::bail!("netstat command not found");
        }
        Ok(Self)
    }

    /// Parse the `netstat -ano` table
    ///
    /// ```text
    ///   Proto  Local Address          Foreign Address        State           PID
    ///   TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1256
    ///   UDP    [::]:5353              *:*                                    2440
    /// ```
    pub fn parse_output(output: &str) -> Vec<RawConnection> {
        let mut connections = Vec::new();

        for line in output.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let Some(proto) = parts.first() else {
                continue;
            };

            let (protocol, state_token, pid_token) = match proto.to_ascii_uppercase().as_str() {
                "TCP" if parts.len() >= 5 => (Protocol::Tcp, Some(parts[3]), parts[4]),
                "UDP" if parts.len() >= 4 => (Protocol::Udp, None, parts[3]),
                _ => continue,
            };

            let ipv6 = parts[1].starts_with('[');
            let Some(local) = parse_endpoint(parts[1], ipv6) else {
                log::debug!("Failed to parse netstat local address '{}'", parts[1]);
                continue;
            };
            let remote = parse_endpoint(parts[2], ipv6).and_then(peer);

            let pid = match pid_token.parse::<u32>() {
                Ok(0) | Err(_) => None,
                Ok(pid) => Some(pid),
            };

            let state = match (protocol, state_token) {
                (Protocol::Tcp, Some(token)) => ConnectionState::from_token(token),
                _ => ConnectionState::None,
            };

            connections.push(RawConnection {
                protocol,
                local,
                remote,
                state,
                pid,
            });
        }

        connections
    }
}

impl ConnectionEnumerator for NetstatEnumerator {
    fn name(&self) -> &'static str {
        "netstat"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Good
    }

    fn is_available() -> bool {
        Command::new("netstat")
            .arg("-?")
            .output()
            .map(|_| true)
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
        let output = Command::new("netstat")
            .args(["-ano"])
            .output()
            .map_err(|e| EnumerationError::Command {
                command: "netstat -ano".to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnumerationError::Command {
                command: "netstat -ano".to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_output(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1256
  TCP    127.0.0.1:49712        127.0.0.1:49713        ESTABLISHED     8812
  TCP    10.0.0.7:50512         52.96.1.2:443          TIME_WAIT       0
  TCP    [::]:445               [::]:0                 LISTENING       4
  UDP    0.0.0.0:5353           *:*                                    2440
  UDP    [fe80::1%7]:1900       *:*                                    3100
";

    #[test]
    fn test_parse_netstat_table() {
        let conns = NetstatEnumerator::parse_output(SAMPLE);
        assert_eq!(conns.len(), 6);

        assert_eq!(conns[0].local, "0.0.0.0:135".parse().unwrap());
        assert_eq!(conns[0].remote, None);
        assert_eq!(conns[0].state, ConnectionState::Listen);
        assert_eq!(conns[0].pid, Some(1256));

        assert_eq!(conns[1].remote, Some("127.0.0.1:49713".parse().unwrap()));
        assert_eq!(conns[1].state, ConnectionState::Established);

        // pid 0 means no owning process
        assert_eq!(conns[2].pid, None);

        assert_eq!(conns[3].local, "[::]:445".parse().unwrap());
        assert_eq!(conns[3].pid, Some(4));

        assert_eq!(conns[4].protocol, Protocol::Udp);
        assert_eq!(conns[4].remote, None);
        assert_eq!(conns[4].state, ConnectionState::None);

        assert_eq!(conns[5].local, "[fe80::1]:1900".parse().unwrap());
    }

    #[test]
    fn test_parse_ignores_headers_and_short_rows() {
        let conns = NetstatEnumerator::parse_output("Proto Local Foreign State PID\nTCP 1.2.3.4:80\n");
        assert!(conns.is_empty());
    }
}
