//! In-memory stand-ins for the OS seams, shared by unit tests.

use crate::backends::connection::{ConnectionEnumerator, RawConnection};
use crate::backends::process::{Lookup, ProcessIdentity, ProcessInspector};
use crate::backends::terminate::ProcessTerminator;
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::error::{EnumerationError, TerminateError};
use crate::port::{ConnectionState, PortRecord, Protocol};
use crate::process::{Attr, ProcessDetail};
use crate::scheduler::RepollRequester;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn raw(pid: Option<u32>, local: &str, remote: Option<&str>) -> RawConnection {
    RawConnection {
        protocol: Protocol::Tcp,
        local: local.parse().unwrap(),
        remote: remote.map(|r| r.parse().unwrap()),
        state: ConnectionState::Established,
        pid,
    }
}

pub fn record(pid: u32, name: &str, local: &str, remote: Option<&str>) -> PortRecord {
    PortRecord {
        pid,
        process_name: name.to_string(),
        protocol: Protocol::Tcp,
        local: local.parse().unwrap(),
        remote: remote.map(|r| r.parse().unwrap()),
        status: ConnectionState::Established,
    }
}

pub fn detail(pid: u32, name: &str) -> ProcessDetail {
    ProcessDetail {
        pid,
        name: name.to_string(),
        status: "Running".to_string(),
        resident_memory: 0,
        virtual_memory: 0,
        cpu_percent: 0.0,
        started_at: None,
        user: Attr::unavailable("test"),
        command_line: Attr::unavailable("test"),
        open_files: Attr::Available(Vec::new()),
        connections: Attr::Available(Vec::new()),
    }
}

pub struct FakeEnumerator {
    connections: Mutex<Vec<RawConnection>>,
    fail: bool,
}

impl FakeEnumerator {
    pub fn new(connections: Vec<RawConnection>) -> Self {
        Self {
            connections: Mutex::new(connections),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

impl ConnectionEnumerator for FakeEnumerator {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Fallback
    }

    fn is_available() -> bool {
        true
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    fn enumerate(&self) -> Result<Vec<RawConnection>, EnumerationError> {
        if self.fail {
            return Err(EnumerationError::PermissionDenied("fake table".into()));
        }
        Ok(self.connections.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeInspector {
    lookups: HashMap<u32, Lookup>,
    flips: HashMap<u32, (String, String)>,
    details: HashMap<u32, ProcessDetail>,
    flip_counter: AtomicUsize,
}

impl FakeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pid: u32, lookup: Lookup) -> Self {
        self.lookups.insert(pid, lookup);
        self
    }

    pub fn named(self, pid: u32, name: &str) -> Self {
        self.with(
            pid,
            Lookup::Found(ProcessIdentity {
                pid,
                name: name.to_string(),
            }),
        )
    }

    /// Alternates between two names on successive lookups
    pub fn flipping(mut self, pid: u32, first: &str, second: &str) -> Self {
        self.flips
            .insert(pid, (first.to_string(), second.to_string()));
        self
    }

    pub fn with_detail(mut self, detail: ProcessDetail) -> Self {
        self.details.insert(detail.pid, detail);
        self
    }
}

impl ProcessInspector for FakeInspector {
    fn identify(&self, pid: u32) -> Lookup {
        if let Some((first, second)) = self.flips.get(&pid) {
            let n = self.flip_counter.fetch_add(1, Ordering::SeqCst);
            let name = if n % 2 == 0 { first } else { second };
            return Lookup::Found(ProcessIdentity {
                pid,
                name: name.clone(),
            });
        }
        self.lookups.get(&pid).cloned().unwrap_or(Lookup::NotFound)
    }

    fn describe(&self, pid: u32) -> Option<ProcessDetail> {
        self.details.get(&pid).cloned()
    }
}

pub struct FakeTerminator {
    result: Result<(), TerminateError>,
    pub calls: Mutex<Vec<(u32, bool)>>,
}

impl FakeTerminator {
    pub fn succeeding() -> Self {
        Self {
            result: Ok(()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: TerminateError) -> Self {
        Self {
            result: Err(err),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ProcessTerminator for FakeTerminator {
    fn terminate(&self, pid: u32, force: bool) -> Result<(), TerminateError> {
        self.calls.lock().unwrap().push((pid, force));
        self.result.clone()
    }
}

#[derive(Default)]
pub struct RecordingRepoll {
    pub delays: Mutex<Vec<Duration>>,
}

impl RepollRequester for RecordingRepoll {
    fn request_repoll(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}
