// Process Control Block (PCB) for the EMOS process lifecycle core
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::{Mutex, MutexGuard};

use crate::machine::Machine;
use crate::sync::{CondVar, Parker};

/// Process ID type
pub type ProcessId = u64;

/// Shared handle to a process record held in the process table
pub type ProcessRef<M> = Arc<ProcessControlBlock<M>>;

/// Process state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running, // Still executing
    Exited,  // Finished, exit status not yet collected (zombie)
    Reaped,  // Exit status collected, or reclaimed as an orphan
}

/// Wait-status word reported to a waiting parent.
///
/// The low two bits hold the termination kind (0 = normal exit,
/// 1 = killed by a signal), the next eight bits the exit code or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(i32);

impl ExitStatus {
    const KIND_MASK: i32 = 0b11;
    const KIND_EXITED: i32 = 0;
    const KIND_SIGNALED: i32 = 1;

    /// Normal termination with `code`; only the low 8 bits are kept
    pub const fn exited(code: i32) -> Self {
        ExitStatus((code & 0xff) << 2)
    }

    /// Termination by `signal`
    pub const fn signaled(signal: i32) -> Self {
        ExitStatus(((signal & 0xff) << 2) | Self::KIND_SIGNALED)
    }

    pub const fn from_raw(raw: i32) -> Self {
        ExitStatus(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_exited(self) -> bool {
        self.0 & Self::KIND_MASK == Self::KIND_EXITED
    }

    pub const fn is_signaled(self) -> bool {
        self.0 & Self::KIND_MASK == Self::KIND_SIGNALED
    }

    /// Exit code of a normal termination
    pub const fn code(self) -> Option<i32> {
        if self.is_exited() {
            Some((self.0 >> 2) & 0xff)
        } else {
            None
        }
    }

    /// Signal number of a signal termination
    pub const fn signal(self) -> Option<i32> {
        if self.is_signaled() {
            Some((self.0 >> 2) & 0xff)
        } else {
            None
        }
    }

    /// Bytes copied out to a waiting parent
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }
}

/// Fields guarded by the record's own lock
#[derive(Debug)]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub exit_status: Option<ExitStatus>,
    /// Creating process, cleared when that process exits first
    pub parent: Option<ProcessId>,
}

impl ProcessStatus {
    fn new(parent: Option<ProcessId>) -> Self {
        Self {
            state: ProcessState::Running,
            exit_status: None,
            parent,
        }
    }

    /// Running -> Exited. Any other transition is a broken invariant.
    pub(crate) fn mark_exited(&mut self, pid: ProcessId, status: ExitStatus) {
        if self.state != ProcessState::Running {
            panic!("process {} exited twice (state {:?})", pid, self.state);
        }
        self.exit_status = Some(status);
        self.state = ProcessState::Exited;
    }

    /// Exited -> Reaped. Any other transition is a broken invariant.
    pub(crate) fn mark_reaped(&mut self, pid: ProcessId) {
        if self.state != ProcessState::Exited {
            panic!("process {} reaped while {:?}", pid, self.state);
        }
        self.state = ProcessState::Reaped;
    }
}

/// Process Control Block (PCB) - one per process.
///
/// Two lock roles live here: `status` guards the lifecycle fields and pairs
/// with the `exited` condition variable; `children` guards membership of
/// this process's child collection. Neither is held while taking the other
/// on the same record.
pub struct ProcessControlBlock<M: Machine> {
    pid: ProcessId,
    name: String,
    status: Mutex<ProcessStatus>,
    exited: CondVar<<M as Parker>::Waker>,
    children: Mutex<Vec<ProcessId>>,
    // Only the owning thread clones the space out of the slot.
    address_space: Mutex<Option<Arc<M::AddressSpace>>>,
    thread_attached: AtomicBool,
}

impl<M: Machine> ProcessControlBlock<M> {
    pub(crate) fn new(pid: ProcessId, name: &str, address_space: M::AddressSpace) -> Self {
        Self {
            pid,
            name: String::from(name),
            status: Mutex::new(ProcessStatus::new(None)),
            exited: CondVar::new(),
            children: Mutex::new(Vec::new()),
            address_space: Mutex::new(Some(Arc::new(address_space))),
            thread_attached: AtomicBool::new(false),
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.status.lock().state
    }

    pub fn parent(&self) -> Option<ProcessId> {
        self.status.lock().parent
    }

    /// Only meaningful once the process has left `Running`
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status.lock().exit_status
    }

    /// Snapshot of the child collection, in creation order
    pub fn children(&self) -> Vec<ProcessId> {
        self.children.lock().clone()
    }

    pub fn has_address_space(&self) -> bool {
        self.address_space.lock().is_some()
    }

    /// Whether a thread is still executing on behalf of this process
    pub fn is_thread_attached(&self) -> bool {
        self.thread_attached.load(Ordering::Acquire)
    }

    pub(crate) fn status_lock(&self) -> &Mutex<ProcessStatus> {
        &self.status
    }

    pub(crate) fn lock_status(&self) -> MutexGuard<'_, ProcessStatus> {
        self.status.lock()
    }

    pub(crate) fn exit_cv(&self) -> &CondVar<<M as Parker>::Waker> {
        &self.exited
    }

    pub(crate) fn lock_children(&self) -> MutexGuard<'_, Vec<ProcessId>> {
        self.children.lock()
    }

    /// Handle to the attached address space. The slot lock is released on
    /// return, so callers may block while using the handle.
    pub(crate) fn address_space(&self) -> Option<Arc<M::AddressSpace>> {
        self.address_space.lock().clone()
    }

    /// Detach the address space, leaving the slot empty.
    ///
    /// Panics if a handle from `address_space` is still alive.
    pub(crate) fn take_address_space(&self) -> Option<M::AddressSpace> {
        let space = self.address_space.lock().take()?;
        match Arc::try_unwrap(space) {
            Ok(space) => Some(space),
            Err(_) => panic!("process {} address space still in use", self.pid),
        }
    }

    pub(crate) fn attach_thread(&self) {
        self.thread_attached.store(true, Ordering::Release);
    }

    pub(crate) fn detach_thread(&self) {
        self.thread_attached.store(false, Ordering::Release);
    }
}

impl<M: Machine> fmt::Debug for ProcessControlBlock<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessControlBlock")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("status", &*self.status.lock())
            .field("children", &*self.children.lock())
            .field("has_address_space", &self.has_address_space())
            .field("thread_attached", &self.is_thread_attached())
            .finish()
    }
}

/// Process management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    OutOfMemory,
    InvalidArgument,
    NoSuchChild,
    FaultOnCopy,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProcessError::OutOfMemory => write!(f, "Out of memory"),
            ProcessError::InvalidArgument => write!(f, "Invalid argument"),
            ProcessError::NoSuchChild => write!(f, "No such child process"),
            ProcessError::FaultOnCopy => write!(f, "Bad user address"),
        }
    }
}
