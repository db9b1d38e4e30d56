// waitpid: block until a named child exits, then collect it
use log::debug;

use super::process_service::{ProcessService, WAIT_NO_OPTIONS};
use crate::machine::{Machine, UserPtr};
use crate::process::pcb::{ProcessError, ProcessId, ProcessRef, ProcessState};

impl<M: Machine> ProcessService<M> {
    /// Wait for child `pid` of `current` to exit and copy its status to `status`.
    ///
    /// Returns `pid` once the child is reaped. A failed copy-out leaves the
    /// child Exited and still waitable.
    pub fn waitpid(
        &self,
        current: &ProcessRef<M>,
        pid: ProcessId,
        status: UserPtr,
        options: i32,
    ) -> Result<ProcessId, ProcessError> {
        if options != WAIT_NO_OPTIONS {
            return Err(ProcessError::InvalidArgument);
        }

        let child = {
            let children = current.lock_children();
            if !children.contains(&pid) {
                return Err(ProcessError::NoSuchChild);
            }
            self.table.get(pid).ok_or(ProcessError::NoSuchChild)?
        };

        let exit_status = {
            let mut guard = child.lock_status();
            while guard.state == ProcessState::Running {
                debug!("[WAIT] process {} blocking on child {}", current.pid(), pid);
                guard = child.exit_cv().wait(child.status_lock(), guard, &*self.machine);
            }
            match guard.exit_status {
                Some(exit_status) => exit_status,
                None => panic!("[WAIT] child {} left Running without a status", pid),
            }
        };

        self.machine.copyout(&exit_status.to_bytes(), status)?;

        current.lock_children().retain(|&child_pid| child_pid != pid);
        self.reap(&child);
        debug!("[WAIT] process {} collected child {}", current.pid(), pid);
        Ok(pid)
    }
}
