// Process Management Service for EMOS - owns the process table and the
// fork/exit/waitpid entry points (see fork.rs, exit.rs, wait.rs)
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, info};

use crate::config::ProcessConfig;
use crate::machine::Machine;
use crate::process::pcb::{ProcessControlBlock, ProcessError, ProcessId, ProcessRef, ProcessState};
use crate::process::table::ProcessTable;

/// The only `options` value waitpid accepts
pub const WAIT_NO_OPTIONS: i32 = 0;

/// Process Management Service - coordinates creation, termination and reaping
pub struct ProcessService<M: Machine> {
    pub(super) machine: Arc<M>,
    pub(super) table: ProcessTable<M>,
}

impl<M: Machine> ProcessService<M> {
    pub fn new(machine: Arc<M>, config: ProcessConfig) -> Result<Self, ProcessError> {
        config.validate()?;
        info!(
            "Process service initialized (pids {}..={})",
            config.pid_min, config.pid_max
        );
        Ok(Self {
            machine,
            table: ProcessTable::new(&config),
        })
    }

    pub fn with_defaults(machine: Arc<M>) -> Self {
        Self {
            machine,
            table: ProcessTable::new(&ProcessConfig::default()),
        }
    }

    /// Create the first process, owned by the calling thread.
    ///
    /// It has no parent, so it reclaims itself when it exits.
    pub fn bootstrap(&self, name: &str, address_space: M::AddressSpace) -> Result<ProcessRef<M>, ProcessError> {
        let pid = match self.table.reserve_pid() {
            Ok(pid) => pid,
            Err(err) => {
                self.machine.as_destroy(address_space);
                return Err(err);
            }
        };
        let record = Arc::new(ProcessControlBlock::new(pid, name, address_space));
        record.attach_thread();
        self.table.insert(record.clone());
        info!("Created process '{}' with PID {}", name, pid);
        Ok(record)
    }

    /// getpid: always succeeds
    pub fn getpid(&self, current: &ProcessRef<M>) -> ProcessId {
        current.pid()
    }

    /// Live (not yet reaped) record for `pid`
    pub fn lookup(&self, pid: ProcessId) -> Option<ProcessRef<M>> {
        self.table.get(pid)
    }

    /// Children of `pid` in creation order; empty for unknown pids
    pub fn children_of(&self, pid: ProcessId) -> Vec<ProcessId> {
        self.table
            .get(pid)
            .map(|pcb| pcb.children())
            .unwrap_or_default()
    }

    pub fn get_process_count(&self) -> usize {
        self.table.len()
    }

    /// List all processes
    pub fn list_processes(&self) -> Vec<(ProcessId, String, ProcessState)> {
        self.table.list()
    }

    /// Get system statistics
    pub fn get_system_stats(&self) -> SystemStats {
        let processes = self.table.list();
        let running_processes = processes
            .iter()
            .filter(|(_, _, state)| *state == ProcessState::Running)
            .count();
        let exited_processes = processes
            .iter()
            .filter(|(_, _, state)| *state == ProcessState::Exited)
            .count();

        SystemStats {
            total_processes: processes.len(),
            running_processes,
            exited_processes,
        }
    }

    /// Final reclamation: Exited -> Reaped, then drop the table's reference.
    ///
    /// The caller has already unlinked `record` from any child collection.
    pub(super) fn reap(&self, record: &ProcessRef<M>) {
        let pid = record.pid();
        record.lock_status().mark_reaped(pid);
        self.table.remove(pid);
        debug!("[REAP] process {} reclaimed", pid);
    }
}

/// System statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStats {
    pub total_processes: usize,
    pub running_processes: usize,
    pub exited_processes: usize,
}
