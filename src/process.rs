use crate::backends::connection::RawConnection;
use chrono::{DateTime, Local};

/// A best-effort attribute: either fetched or explicitly unavailable
#[derive(Debug, Clone, PartialEq)]
pub enum Attr<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Attr<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Attr::Unavailable(reason.into())
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Attr::Available(_))
    }

    pub fn as_ref(&self) -> Attr<&T> {
        match self {
            Attr::Available(value) => Attr::Available(value),
            Attr::Unavailable(reason) => Attr::Unavailable(reason.clone()),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Attr<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Attr::Available(value),
            Err(e) => Attr::Unavailable(e.to_string()),
        }
    }
}

/// On-demand process attributes, fetched lazily for the detail view
#[derive(Debug, Clone)]
pub struct ProcessDetail {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub resident_memory: u64, // bytes
    pub virtual_memory: u64,  // bytes
    pub cpu_percent: f32,
    pub started_at: Option<DateTime<Local>>,
    pub user: Attr<String>,
    pub command_line: Attr<String>,
    pub open_files: Attr<Vec<String>>,
    pub connections: Attr<Vec<RawConnection>>,
}

impl ProcessDetail {
    /// Render the detail view as plain text lines
    pub fn lines(&self, max_open_files: usize) -> Vec<String> {
        let mut lines = vec![
            format!("Name: {}", self.name),
            format!("PID: {}", self.pid),
            format!("Status: {}", self.status),
            format!("Memory: {}", format_bytes(self.resident_memory)),
            format!("Virtual memory: {}", format_bytes(self.virtual_memory)),
            format!("CPU: {:.1}%", self.cpu_percent),
        ];

        match self.started_at {
            Some(started) => lines.push(format!(
                "Started: {}",
                started.format("%Y-%m-%d %H:%M:%S")
            )),
            None => lines.push("Started: unknown".to_string()),
        }

        lines.push(attr_line("User", self.user.as_ref()));
        lines.push(attr_line("Command line", self.command_line.as_ref()));

        match &self.open_files {
            Attr::Available(files) if files.is_empty() => {}
            Attr::Available(files) => {
                lines.push(String::new());
                lines.push("Open files:".to_string());
                for path in files.iter().take(max_open_files) {
                    lines.push(format!("  {}", path));
                }
                if files.len() > max_open_files {
                    lines.push(format!(
                        "  ... {} more not shown",
                        files.len() - max_open_files
                    ));
                }
            }
            Attr::Unavailable(reason) => {
                lines.push(format!("Open files: unavailable ({})", reason));
            }
        }

        match &self.connections {
            Attr::Available(conns) if conns.is_empty() => {}
            Attr::Available(conns) => {
                lines.push(String::new());
                lines.push("Connections:".to_string());
                for conn in conns {
                    lines.push(format!(
                        "  {} - local: {}, remote: {}, state: {}",
                        conn.protocol,
                        conn.local,
                        conn.remote
                            .map(|addr| addr.to_string())
                            .unwrap_or_else(|| "N/A".to_string()),
                        conn.state
                    ));
                }
            }
            Attr::Unavailable(reason) => {
                lines.push(format!("Connections: unavailable ({})", reason));
            }
        }

        lines
    }
}

fn attr_line(label: &str, attr: Attr<&String>) -> String {
    match attr {
        Attr::Available(value) => format!("{}: {}", label, value),
        Attr::Unavailable(reason) => format!("{}: unavailable ({})", label, reason),
    }
}

/// Format a byte count with binary units and two decimals
///
/// Divides by 1024 while the value is at least 1024, up to PB.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} PB", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{ConnectionState, Protocol};

    fn detail() -> ProcessDetail {
        ProcessDetail {
            pid: 4242,
            name: "nginx".to_string(),
            status: "Sleeping".to_string(),
            resident_memory: 1536,
            virtual_memory: 1048576,
            cpu_percent: 2.5,
            started_at: None,
            user: Attr::Available("www-data".to_string()),
            command_line: Attr::unavailable("permission denied"),
            open_files: Attr::Available(Vec::new()),
            connections: Attr::Available(Vec::new()),
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1024u64.pow(3) * 3), "3.00 GB");
        assert_eq!(format_bytes(1024u64.pow(4)), "1.00 TB");
        assert_eq!(format_bytes(1024u64.pow(5) * 2), "2.00 PB");
    }

    #[test]
    fn test_detail_lines_degrade_per_field() {
        let lines = detail().lines(20);
        assert_eq!(lines[0], "Name: nginx");
        assert_eq!(lines[1], "PID: 4242");
        assert!(lines.contains(&"Memory: 1.50 KB".to_string()));
        assert!(lines.contains(&"Virtual memory: 1.00 MB".to_string()));
        assert!(lines.contains(&"User: www-data".to_string()));
        assert!(lines.contains(&"Command line: unavailable (permission denied)".to_string()));
        assert!(lines.contains(&"Started: unknown".to_string()));
    }

    #[test]
    fn test_detail_lines_truncate_open_files() {
        let mut detail = detail();
        detail.open_files = Attr::Available((0..25).map(|i| format!("/tmp/f{}", i)).collect());
        let lines = detail.lines(20);

        let shown = lines.iter().filter(|l| l.starts_with("  /tmp/f")).count();
        assert_eq!(shown, 20);
        assert!(lines.contains(&"  ... 5 more not shown".to_string()));
    }

    #[test]
    fn test_detail_lines_connections() {
        let mut detail = detail();
        detail.connections = Attr::Available(vec![RawConnection {
            protocol: Protocol::Tcp,
            local: "127.0.0.1:8080".parse().unwrap(),
            remote: None,
            state: ConnectionState::Listen,
            pid: Some(4242),
        }]);
        detail.open_files = Attr::unavailable("not supported on this platform");

        let lines = detail.lines(20);
        assert!(lines.contains(
            &"  TCP - local: 127.0.0.1:8080, remote: N/A, state: LISTEN".to_string()
        ));
        assert!(lines.contains(
            &"Open files: unavailable (not supported on this platform)".to_string()
        ));
    }
}
