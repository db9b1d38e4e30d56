// fork: duplicate the calling process into a new child
use alloc::boxed::Box;
use alloc::sync::Arc;
use log::{info, warn};

use super::process_service::ProcessService;
use crate::machine::{Machine, ThreadEntry};
use crate::process::context::ForkContext;
use crate::process::pcb::{ProcessControlBlock, ProcessError, ProcessId, ProcessRef};

impl<M: Machine> ProcessService<M> {
    /// Create a child of `current` that resumes from a copy of `context`.
    ///
    /// Returns the child's pid; the child itself sees 0. On failure nothing
    /// new is visible: no child entry, no table record, no address space,
    /// and the reserved pid goes back to the allocator.
    pub fn fork(&self, current: &ProcessRef<M>, context: &M::Context) -> Result<ProcessId, ProcessError> {
        let pid = self.table.reserve_pid().map_err(|err| {
            warn!("[FORK] process {}: no free pid", current.pid());
            err
        })?;

        let parent_space = match current.address_space() {
            Some(space) => space,
            None => panic!("[FORK] process {} has no address space", current.pid()),
        };
        let copied = self.machine.as_copy(&parent_space);
        drop(parent_space);
        let space = match copied {
            Some(space) => space,
            None => {
                self.table.release_pid(pid);
                warn!("[FORK] process {}: address space copy failed", current.pid());
                return Err(ProcessError::OutOfMemory);
            }
        };

        let child = Arc::new(ProcessControlBlock::new(pid, current.name(), space));
        self.table.insert(child.clone());
        {
            let mut children = current.lock_children();
            child.lock_status().parent = Some(current.pid());
            children.push(pid);
        }

        let entry: ThreadEntry = {
            let machine = self.machine.clone();
            let child = child.clone();
            let context = context.clone();
            Box::new(move || {
                enter_forked_process(machine, child, context);
            })
        };
        if let Err(err) = self.machine.thread_fork(current.name(), entry) {
            warn!("[FORK] process {}: thread start failed: {}", current.pid(), err);
            self.discard_unstarted_child(current, &child);
            return Err(ProcessError::OutOfMemory);
        }

        info!("[FORK] process {} created child {}", current.pid(), pid);
        Ok(pid)
    }

    /// Undo a fork whose thread never started
    fn discard_unstarted_child(&self, current: &ProcessRef<M>, child: &ProcessRef<M>) {
        {
            let mut children = current.lock_children();
            children.retain(|&pid| pid != child.pid());
            child.lock_status().parent = None;
        }
        if let Some(space) = child.take_address_space() {
            self.machine.as_destroy(space);
        }
        self.table.remove(child.pid());
    }
}

/// First code a forked thread runs
fn enter_forked_process<M: Machine>(machine: Arc<M>, child: ProcessRef<M>, mut context: M::Context) -> ! {
    child.attach_thread();
    match child.address_space() {
        Some(space) => machine.as_activate(&space),
        None => panic!("[FORK] child {} started without an address space", child.pid()),
    }
    context.set_return_value(0);
    machine.enter_forked_process(child, context)
}
