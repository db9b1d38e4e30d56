// Process table: every record not yet reaped, keyed by pid
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use spin::RwLock;

use super::pcb::{ProcessError, ProcessId, ProcessRef, ProcessState};
use super::pid::PidAllocator;
use crate::config::ProcessConfig;
use crate::machine::Machine;

/// Arena of live records. Parent/child edges elsewhere are plain pids
/// resolved through it. The table lock is a leaf: nothing else is locked
/// while it is held.
pub(crate) struct ProcessTable<M: Machine> {
    records: RwLock<BTreeMap<ProcessId, ProcessRef<M>>>,
    pids: PidAllocator,
}

impl<M: Machine> ProcessTable<M> {
    /// `config` must already be validated
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            pids: PidAllocator::new(config),
        }
    }

    /// Reserve an id for a record about to be built
    pub fn reserve_pid(&self) -> Result<ProcessId, ProcessError> {
        self.pids.alloc().ok_or(ProcessError::OutOfMemory)
    }

    /// Give back an id whose record never made it into the table
    pub fn release_pid(&self, pid: ProcessId) {
        self.pids.release(pid);
    }

    pub fn insert(&self, record: ProcessRef<M>) {
        let previous = self.records.write().insert(record.pid(), record);
        debug_assert!(previous.is_none(), "pid reused while still live");
    }

    pub fn get(&self, pid: ProcessId) -> Option<ProcessRef<M>> {
        self.records.read().get(&pid).cloned()
    }

    /// Drop the table's reference and recycle the id
    pub fn remove(&self, pid: ProcessId) -> Option<ProcessRef<M>> {
        let record = self.records.write().remove(&pid);
        if record.is_some() {
            self.pids.release(pid);
        }
        record
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// (pid, name, state) for every live record, in pid order
    pub fn list(&self) -> Vec<(ProcessId, String, ProcessState)> {
        let records: Vec<ProcessRef<M>> = self.records.read().values().cloned().collect();
        records
            .iter()
            .map(|pcb| (pcb.pid(), String::from(pcb.name()), pcb.state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosted::HostMachine;
    use crate::process::pcb::ProcessControlBlock;
    use alloc::sync::Arc;

    #[test]
    fn removed_ids_are_recycled_after_saturation() {
        let machine = HostMachine::new();
        let table: ProcessTable<HostMachine> =
            ProcessTable::new(&ProcessConfig::new(1, 2).unwrap());

        let a = table.reserve_pid().unwrap();
        let b = table.reserve_pid().unwrap();
        assert_eq!(table.reserve_pid(), Err(ProcessError::OutOfMemory));

        table.insert(Arc::new(ProcessControlBlock::new(a, "a", machine.new_address_space())));
        assert!(table.get(a).is_some());
        assert_eq!(table.len(), 1);

        table.release_pid(b);
        assert!(table.remove(a).is_some());
        assert!(table.remove(a).is_none());
        assert_eq!(table.len(), 0);

        let mut again = [table.reserve_pid().unwrap(), table.reserve_pid().unwrap()];
        again.sort();
        assert_eq!(again, [a, b]);
    }

    #[test]
    fn list_reports_pid_order() {
        let machine = HostMachine::new();
        let table: ProcessTable<HostMachine> = ProcessTable::new(&ProcessConfig::default());
        for name in ["init", "sh"] {
            let pid = table.reserve_pid().unwrap();
            table.insert(Arc::new(ProcessControlBlock::new(pid, name, machine.new_address_space())));
        }
        let listed = table.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].1, "init");
        assert_eq!(listed[1].2, ProcessState::Running);
        assert!(table.get(listed[1].0).is_some());
    }
}
