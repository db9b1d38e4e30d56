// EMOS process lifecycle core: fork, exit, waitpid and getpid
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod config;
pub mod machine;
pub mod process;
pub mod services;
pub mod sync;
pub mod syscalls;

#[cfg(any(test, feature = "std"))]
pub mod hosted;

pub use config::ProcessConfig;
pub use machine::{Machine, ThreadEntry, UserPtr};
pub use process::{
    ExitStatus, ForkContext, ProcessControlBlock, ProcessError, ProcessId, ProcessRef,
    ProcessState, TrapFrame,
};
pub use services::process_service::{ProcessService, SystemStats, WAIT_NO_OPTIONS};
pub use syscalls::{handle_syscall, SyscallArgs, SyscallError, SyscallNumber, SyscallResult};
