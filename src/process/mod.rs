// Process records, ids and execution context
pub mod context;
pub mod pcb;
pub(crate) mod pid;
pub(crate) mod table;

pub use context::{ForkContext, TrapFrame};
pub use pcb::{
    ExitStatus, ProcessControlBlock, ProcessError, ProcessId, ProcessRef, ProcessState,
    ProcessStatus,
};
