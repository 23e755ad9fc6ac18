//! Port / process-name predicates over a snapshot.
//!
//! Filtering is pure: it never touches the snapshot it reads and can be
//! re-derived from any snapshot and filter.

use crate::port::{PortRecord, Snapshot};
use serde::{Deserialize, Serialize};

/// User-supplied predicates. Empty or whitespace-only means "match all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Substring of the local port number
    pub port: Option<String>,
    /// Case-insensitive substring of the process name
    pub process_name: Option<String>,
}

impl FilterSpec {
    pub fn new(port: Option<String>, process_name: Option<String>) -> Self {
        Self { port, process_name }
    }

    fn port_needle(&self) -> Option<&str> {
        self.port.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn name_needle(&self) -> Option<String> {
        self.process_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn is_empty(&self) -> bool {
        self.port_needle().is_none() && self.name_needle().is_none()
    }

    pub fn matches(&self, record: &PortRecord) -> bool {
        Matcher::new(self).matches(record)
    }

    /// Keep matching records in their original order
    pub fn apply(&self, records: &[PortRecord]) -> Vec<PortRecord> {
        let matcher = Matcher::new(self);
        records
            .iter()
            .filter(|record| matcher.matches(record))
            .cloned()
            .collect()
    }

    /// Short description for the status bar
    pub fn describe(&self) -> String {
        match (self.port_needle(), self.name_needle()) {
            (None, None) => "none".to_string(),
            (Some(port), None) => format!("port ~ {}", port),
            (None, Some(name)) => format!("process ~ {}", name),
            (Some(port), Some(name)) => format!("port ~ {}, process ~ {}", port, name),
        }
    }
}

// Needles normalised once per apply
struct Matcher<'a> {
    port: Option<&'a str>,
    name: Option<String>,
}

impl<'a> Matcher<'a> {
    fn new(spec: &'a FilterSpec) -> Self {
        Self {
            port: spec.port_needle(),
            name: spec.name_needle(),
        }
    }

    fn matches(&self, record: &PortRecord) -> bool {
        let port_ok = self
            .port
            .is_none_or(|needle| record.local.port().to_string().contains(needle));
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|needle| record.process_name.to_lowercase().contains(needle));
        port_ok && name_ok
    }
}

impl Snapshot {
    pub fn filtered(&self, spec: &FilterSpec) -> Vec<PortRecord> {
        spec.apply(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    fn sample() -> Vec<PortRecord> {
        vec![
            record(10, "Chrome.exe", "127.0.0.1:8080", Some("10.0.0.1:443")),
            record(11, "postgres", "0.0.0.0:5432", None),
            record(12, "curl", "192.168.1.4:51000", Some("10.0.0.1:8080")),
            record(13, "nginx", "[::]:80", None),
        ]
    }

    fn spec(port: &str, name: &str) -> FilterSpec {
        FilterSpec::new(Some(port.to_string()), Some(name.to_string()))
    }

    #[test]
    fn test_empty_spec_is_identity() {
        let records = sample();
        assert_eq!(FilterSpec::default().apply(&records), records);
        assert_eq!(spec("", "").apply(&records), records);
        assert_eq!(spec("  ", "\t").apply(&records), records);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let records = sample();
        for f in [spec("80", ""), spec("", "c"), spec("5", "post"), spec("9", "")] {
            let once = f.apply(&records);
            assert_eq!(f.apply(&once), once);
        }
    }

    #[test]
    fn test_port_matches_local_port_only() {
        let records = sample();
        let matched = spec("808", "").apply(&records);
        // curl only has 8080 on the remote side
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].pid, 10);
    }

    #[test]
    fn test_port_does_not_match_address() {
        let records = sample();
        // "192" appears in curl's local IP, not in any local port
        assert!(spec("192", "").apply(&records).is_empty());
    }

    #[test]
    fn test_process_name_case_insensitive() {
        let records = sample();
        let matched = spec("", "chrome").apply(&records);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].process_name, "Chrome.exe");

        assert_eq!(spec("", "NGINX").apply(&records).len(), 1);
    }

    #[test]
    fn test_predicates_are_anded() {
        let records = sample();
        assert_eq!(spec("80", "nginx").apply(&records).len(), 1);
        assert!(spec("5432", "nginx").apply(&records).is_empty());
    }

    #[test]
    fn test_filtering_keeps_order_and_base() {
        let snapshot = Snapshot::new(1, sample());
        let filtered = snapshot.filtered(&spec("", "c"));
        let pids: Vec<u32> = filtered.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![10, 12]);
        assert_eq!(snapshot.len(), 4);
    }

    #[test]
    fn test_matches_single_record() {
        let records = sample();
        let f = spec("54", "POST");
        assert!(f.matches(&records[1]));
        assert!(!f.matches(&records[0]));
        assert!(FilterSpec::default().is_empty());
        assert!(!f.is_empty());
    }

    #[test]
    fn test_describe() {
        assert_eq!(FilterSpec::default().describe(), "none");
        assert_eq!(spec("80", "Web").describe(), "port ~ 80, process ~ web");
    }
}
