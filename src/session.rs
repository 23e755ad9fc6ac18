//! Command surface between a front end and the acquisition core.
//!
//! Front ends (terminal UI, one-shot CLI) never call the backends directly.
//! They send a [`Command`] and render the [`Reply`]. Anything that touches
//! the OS runs on the blocking pool.

use crate::backends::process::ProcessInspector;
use crate::controller::{PendingTermination, ProcessController, TerminateOutcome};
use crate::filter::FilterSpec;
use crate::port::PortRecord;
use crate::process::ProcessDetail;
use crate::scheduler::{PollingScheduler, TriggerOutcome, TriggerSource};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    SetFilter(FilterSpec),
    RequestDetail(u32),
    RequestTerminate { pid: u32, force: bool },
    ConfirmTerminate(PendingTermination),
}

#[derive(Debug, Clone)]
pub enum Reply {
    Refreshing,
    AlreadyRefreshing,
    Rows(Vec<PortRecord>),
    Detail(u32, Option<ProcessDetail>),
    Confirm(PendingTermination),
    Terminated(TerminateOutcome),
}

pub struct Session {
    scheduler: PollingScheduler,
    inspector: Arc<dyn ProcessInspector>,
    controller: Arc<ProcessController>,
    filter: FilterSpec,
}

impl Session {
    pub fn new(
        scheduler: PollingScheduler,
        inspector: Arc<dyn ProcessInspector>,
        controller: Arc<ProcessController>,
        filter: FilterSpec,
    ) -> Self {
        Self {
            scheduler,
            inspector,
            controller,
            filter,
        }
    }

    pub fn scheduler(&self) -> &PollingScheduler {
        &self.scheduler
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    /// Filtered view of the current snapshot
    pub fn rows(&self) -> Vec<PortRecord> {
        self.scheduler
            .current()
            .map(|snapshot| snapshot.filtered(&self.filter))
            .unwrap_or_default()
    }

    pub async fn dispatch(&mut self, command: Command) -> Reply {
        log::debug!("Dispatching {:?}", command);

        match command {
            Command::Refresh => match self.scheduler.trigger(TriggerSource::Demand) {
                TriggerOutcome::Started => Reply::Refreshing,
                TriggerOutcome::Coalesced => Reply::AlreadyRefreshing,
            },
            Command::SetFilter(spec) => {
                self.filter = spec;
                Reply::Rows(self.rows())
            }
            Command::RequestDetail(pid) => {
                let inspector = Arc::clone(&self.inspector);
                let detail = tokio::task::spawn_blocking(move || inspector.describe(pid))
                    .await
                    .unwrap_or_else(|e| {
                        log::error!("Detail lookup for PID {} aborted: {}", pid, e);
                        None
                    });
                Reply::Detail(pid, detail)
            }
            Command::RequestTerminate { pid, force } => {
                let controller = Arc::clone(&self.controller);
                match tokio::task::spawn_blocking(move || controller.resolve(pid, force)).await {
                    Ok(Ok(pending)) => Reply::Confirm(pending),
                    Ok(Err(outcome)) => Reply::Terminated(outcome),
                    Err(e) => Reply::Terminated(TerminateOutcome::Failed {
                        pid,
                        reason: e.to_string(),
                    }),
                }
            }
            Command::ConfirmTerminate(pending) => {
                let pid = pending.pid;
                let controller = Arc::clone(&self.controller);
                let outcome = tokio::task::spawn_blocking(move || controller.execute(pending))
                    .await
                    .unwrap_or_else(|e| TerminateOutcome::Failed {
                        pid,
                        reason: e.to_string(),
                    });
                Reply::Terminated(outcome)
            }
        }
    }
}
