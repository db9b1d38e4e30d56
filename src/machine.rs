// Kernel services the process core consumes but does not implement
use alloc::boxed::Box;

use crate::process::context::ForkContext;
use crate::process::pcb::{ProcessError, ProcessRef};
use crate::sync::Parker;

/// Address inside the current process's user address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserPtr(pub u64);

impl UserPtr {
    pub const NULL: UserPtr = UserPtr(0);

    pub const fn new(addr: u64) -> Self {
        UserPtr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Body of a freshly started kernel thread
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Address spaces, threads and user-memory access, as provided by the
/// surrounding kernel.
///
/// The process core treats every one of these as opaque. Implementations
/// report resource exhaustion from `as_copy` as `None` and from
/// `thread_fork` as `ProcessError::OutOfMemory`, and an unwritable
/// destination in `copyout` as `ProcessError::FaultOnCopy`.
pub trait Machine: Parker + Send + Sync + Sized + 'static {
    /// A process's private address space
    type AddressSpace: Send + Sync + 'static;
    /// Register snapshot a forked thread resumes from
    type Context: ForkContext;

    /// Duplicate `src` into a new, independent address space
    fn as_copy(&self, src: &Self::AddressSpace) -> Option<Self::AddressSpace>;

    /// Make `space` the active address space of the calling thread
    fn as_activate(&self, space: &Self::AddressSpace);

    /// Drop whatever address space the calling thread has active
    fn as_deactivate(&self);

    /// Tear down an address space; may block
    fn as_destroy(&self, space: Self::AddressSpace);

    /// Start a thread named `name` that runs `entry` once
    fn thread_fork(&self, name: &str, entry: ThreadEntry) -> Result<(), ProcessError>;

    /// Release the calling thread permanently
    fn thread_exit(&self) -> !;

    /// Copy `src` to `dest` in the active user address space
    fn copyout(&self, src: &[u8], dest: UserPtr) -> Result<(), ProcessError>;

    /// Install `context` on the calling thread and return to user mode as `current`
    fn enter_forked_process(&self, current: ProcessRef<Self>, context: Self::Context) -> !;
}
