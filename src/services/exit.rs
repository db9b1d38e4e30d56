// _exit: tear the calling process down and hand its status to the parent
use alloc::vec::Vec;
use log::{debug, info};

use super::process_service::ProcessService;
use crate::machine::Machine;
use crate::process::pcb::{ExitStatus, ProcessRef, ProcessState};

impl<M: Machine> ProcessService<M> {
    /// Terminate `current` with `exit_code`. Runs on the process's own thread.
    ///
    /// The address space is destroyed, children are disowned, the record
    /// becomes Exited and its waiter (if any) is woken. A process without a
    /// parent reclaims itself on the spot.
    pub fn exit(&self, current: ProcessRef<M>, exit_code: i32) -> ! {
        let pid = current.pid();
        debug!("[EXIT] process {} exiting with code {}", pid, exit_code);

        let space = match current.take_address_space() {
            Some(space) => space,
            None => panic!("[EXIT] process {} has no address space", pid),
        };
        self.machine.as_deactivate();
        self.machine.as_destroy(space);
        current.detach_thread();

        self.disown_children(&current);

        let orphan = {
            let mut status = current.lock_status();
            status.mark_exited(pid, ExitStatus::exited(exit_code));
            if status.parent.is_some() {
                current.exit_cv().notify_all(&*self.machine);
                false
            } else {
                true
            }
        };

        if orphan {
            self.reap(&current);
            info!("[EXIT] orphan {} reclaimed at exit", pid);
        } else {
            info!("[EXIT] process {} is waiting to be reaped", pid);
        }

        drop(current);
        self.machine.thread_exit()
    }

    /// Cut every child loose from `parent`.
    ///
    /// Exited children are reaped now. Running children lose their parent
    /// link and reclaim themselves when they exit. The child's own lock
    /// decides the race with a child exiting at the same moment.
    fn disown_children(&self, parent: &ProcessRef<M>) {
        let mut zombies = Vec::new();
        {
            let mut children = parent.lock_children();
            for pid in children.drain(..) {
                let Some(child) = self.table.get(pid) else {
                    continue;
                };
                let mut status = child.lock_status();
                status.parent = None;
                if status.state == ProcessState::Exited {
                    drop(status);
                    zombies.push(child);
                } else {
                    debug!("[EXIT] process {} orphaned child {}", parent.pid(), pid);
                }
            }
        }

        for child in zombies {
            self.reap(&child);
        }
    }
}
