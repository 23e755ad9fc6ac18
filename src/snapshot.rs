use crate::backends::connection::ConnectionEnumerator;
use crate::backends::process::ProcessInspector;
use crate::error::AcquisitionError;
use crate::port::{PortRecord, Snapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Anything that can produce a complete snapshot in one blocking call
pub trait SnapshotSource: Send + Sync {
    fn build(&self) -> Result<Snapshot, AcquisitionError>;
}

/// Joins enumerated connections with process identities
pub struct SnapshotBuilder {
    enumerator: Arc<dyn ConnectionEnumerator>,
    inspector: Arc<dyn ProcessInspector>,
    generation: AtomicU64,
}

impl SnapshotBuilder {
    pub fn new(
        enumerator: Arc<dyn ConnectionEnumerator>,
        inspector: Arc<dyn ProcessInspector>,
    ) -> Self {
        Self {
            enumerator,
            inspector,
            generation: AtomicU64::new(0),
        }
    }
}

impl SnapshotSource for SnapshotBuilder {
    fn build(&self) -> Result<Snapshot, AcquisitionError> {
        let started = Instant::now();
        let raw = self.enumerator.enumerate()?;

        self.inspector.begin_pass();

        // pid -> name, valid for this pass only (pids get reused)
        let mut names: HashMap<u32, String> = HashMap::new();
        let mut records = Vec::with_capacity(raw.len());
        let mut unowned = 0usize;

        for conn in raw {
            let Some(pid) = conn.pid else {
                unowned += 1;
                continue;
            };

            let process_name = names
                .entry(pid)
                .or_insert_with(|| self.inspector.identify(pid).display_name())
                .clone();

            records.push(PortRecord {
                pid,
                process_name,
                protocol: conn.protocol,
                local: conn.local,
                remote: conn.remote,
                status: conn.state,
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(
            "Snapshot #{} from {}: {} record(s), {} process(es), {} unowned dropped, {:?}",
            generation,
            self.enumerator.name(),
            records.len(),
            names.len(),
            unowned,
            started.elapsed()
        );

        Ok(Snapshot::new(generation, records))
    }
}
