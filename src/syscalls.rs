// src/syscalls.rs
use core::fmt;
#[cfg(feature = "trace-syscalls")]
use log::trace;
use log::debug;

use crate::machine::{Machine, UserPtr};
use crate::process::pcb::{ProcessError, ProcessId, ProcessRef};
use crate::services::process_service::ProcessService;

/// System call numbers
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallNumber {
    Fork = 0,
    Exit = 1,
    WaitPid = 2,
    GetPid = 3,
}

impl TryFrom<u64> for SyscallNumber {
    type Error = SyscallError;

    fn try_from(number: u64) -> Result<Self, Self::Error> {
        match number {
            0 => Ok(SyscallNumber::Fork),
            1 => Ok(SyscallNumber::Exit),
            2 => Ok(SyscallNumber::WaitPid),
            3 => Ok(SyscallNumber::GetPid),
            _ => Err(SyscallError::InvalidSyscall),
        }
    }
}

/// System call arguments (up to 6 arguments in x86_64)
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs {
    pub arg0: u64,  // rdi
    pub arg1: u64,  // rsi
    pub arg2: u64,  // rdx
    pub arg3: u64,  // r10
    pub arg4: u64,  // r8
    pub arg5: u64,  // r9
}

/// System call result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    Success(u64),
    Error(SyscallError),
}

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall,
    InvalidArgument,
    OutOfMemory,
    NoSuchChild,
    FaultOnCopy,
}

impl SyscallError {
    /// Kernel errno value reported to user space
    pub fn errno(self) -> u64 {
        match self {
            SyscallError::InvalidSyscall => 1,  // ENOSYS
            SyscallError::OutOfMemory => 3,     // ENOMEM
            SyscallError::FaultOnCopy => 6,     // EFAULT
            SyscallError::InvalidArgument => 8, // EINVAL
            SyscallError::NoSuchChild => 16,    // ECHILD
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyscallError::InvalidSyscall => write!(f, "Invalid syscall number"),
            SyscallError::InvalidArgument => write!(f, "Invalid argument"),
            SyscallError::OutOfMemory => write!(f, "Out of memory"),
            SyscallError::NoSuchChild => write!(f, "No such child process"),
            SyscallError::FaultOnCopy => write!(f, "Bad user address"),
        }
    }
}

impl From<ProcessError> for SyscallError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::OutOfMemory => SyscallError::OutOfMemory,
            ProcessError::InvalidArgument => SyscallError::InvalidArgument,
            ProcessError::NoSuchChild => SyscallError::NoSuchChild,
            ProcessError::FaultOnCopy => SyscallError::FaultOnCopy,
        }
    }
}

impl From<Result<ProcessId, ProcessError>> for SyscallResult {
    fn from(result: Result<ProcessId, ProcessError>) -> Self {
        match result {
            Ok(value) => SyscallResult::Success(value),
            Err(err) => SyscallResult::Error(err.into()),
        }
    }
}

/// Convert syscall result to u64 for return value
impl From<SyscallResult> for u64 {
    fn from(result: SyscallResult) -> u64 {
        match result {
            SyscallResult::Success(value) => value,
            SyscallResult::Error(err) => {
                // Use high bit to indicate error
                0x8000_0000_0000_0000 | err.errno()
            }
        }
    }
}

/// Handle a system call made by `current`, whose saved registers are `context`
pub fn handle_syscall<M: Machine>(
    service: &ProcessService<M>,
    current: &ProcessRef<M>,
    context: &M::Context,
    syscall_num: u64,
    args: SyscallArgs,
) -> SyscallResult {
    #[cfg(feature = "trace-syscalls")]
    trace!("[SYSCALL] pid {} nr {} args {:?}", current.pid(), syscall_num, args);

    let number = match SyscallNumber::try_from(syscall_num) {
        Ok(number) => number,
        Err(err) => {
            debug!("[SYSCALL] pid {}: unknown syscall {}", current.pid(), syscall_num);
            return SyscallResult::Error(err);
        }
    };

    let result = match number {
        SyscallNumber::Fork => syscall_fork(service, current, context),
        SyscallNumber::Exit => syscall_exit(service, current, args),
        SyscallNumber::WaitPid => syscall_waitpid(service, current, args),
        SyscallNumber::GetPid => syscall_getpid(service, current),
    };

    #[cfg(feature = "trace-syscalls")]
    trace!("[SYSCALL] pid {} {:?} -> {:?}", current.pid(), number, result);

    result
}

// Individual syscall implementations
pub fn syscall_fork<M: Machine>(
    service: &ProcessService<M>,
    current: &ProcessRef<M>,
    context: &M::Context,
) -> SyscallResult {
    service.fork(current, context).into()
}

pub fn syscall_exit<M: Machine>(service: &ProcessService<M>, current: &ProcessRef<M>, args: SyscallArgs) -> ! {
    // The exit code travels as a C int in the low half of rdi
    let exit_code = args.arg0 as u32 as i32;
    service.exit(current.clone(), exit_code)
}

pub fn syscall_waitpid<M: Machine>(
    service: &ProcessService<M>,
    current: &ProcessRef<M>,
    args: SyscallArgs,
) -> SyscallResult {
    let pid: ProcessId = args.arg0;
    let status = UserPtr::new(args.arg1);
    let options = match i32::try_from(args.arg2) {
        Ok(options) => options,
        Err(_) => return SyscallResult::Error(SyscallError::InvalidArgument),
    };
    service.waitpid(current, pid, status, options).into()
}

pub fn syscall_getpid<M: Machine>(service: &ProcessService<M>, current: &ProcessRef<M>) -> SyscallResult {
    SyscallResult::Success(service.getpid(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosted::{HostContext, HostMachine};
    use crate::process::pcb::ExitStatus;
    use alloc::sync::Arc;

    fn boot() -> (Arc<HostMachine>, ProcessService<HostMachine>, ProcessRef<HostMachine>) {
        let machine = Arc::new(HostMachine::new());
        let service = ProcessService::with_defaults(machine.clone());
        let init = service.bootstrap("init", machine.new_address_space()).unwrap();
        (machine, service, init)
    }

    fn args(arg0: u64, arg1: u64, arg2: u64) -> SyscallArgs {
        SyscallArgs { arg0, arg1, arg2, ..SyscallArgs::default() }
    }

    #[test]
    fn numbers_round_trip_through_dispatch_table() {
        assert_eq!(SyscallNumber::try_from(2), Ok(SyscallNumber::WaitPid));
        assert_eq!(SyscallNumber::try_from(99), Err(SyscallError::InvalidSyscall));
    }

    #[test]
    fn errors_map_to_errno_values() {
        assert_eq!(SyscallError::from(ProcessError::OutOfMemory).errno(), 3);
        assert_eq!(SyscallError::from(ProcessError::FaultOnCopy).errno(), 6);
        assert_eq!(SyscallError::from(ProcessError::InvalidArgument).errno(), 8);
        assert_eq!(SyscallError::from(ProcessError::NoSuchChild).errno(), 16);
        assert_eq!(
            u64::from(SyscallResult::Error(SyscallError::NoSuchChild)),
            0x8000_0000_0000_0010
        );
    }

    #[test]
    fn unknown_syscall_is_rejected() {
        let (_machine, service, init) = boot();
        let result = handle_syscall(&service, &init, &HostContext::idle(), 42, SyscallArgs::default());
        assert_eq!(result, SyscallResult::Error(SyscallError::InvalidSyscall));
    }

    #[test]
    fn getpid_reports_caller() {
        let (_machine, service, init) = boot();
        let result = handle_syscall(&service, &init, &HostContext::idle(), 3, SyscallArgs::default());
        assert_eq!(result, SyscallResult::Success(init.pid()));
    }

    #[test]
    fn waitpid_rejects_options_and_strangers() {
        let (machine, service, init) = boot();
        let status = machine.user_slot(0);
        let ctx = HostContext::idle();

        let result = handle_syscall(&service, &init, &ctx, 2, args(init.pid(), status.as_u64(), 1));
        assert_eq!(result, SyscallResult::Error(SyscallError::InvalidArgument));
        let result = handle_syscall(&service, &init, &ctx, 2, args(77, status.as_u64(), 1 << 40));
        assert_eq!(result, SyscallResult::Error(SyscallError::InvalidArgument));
        let result = handle_syscall(&service, &init, &ctx, 2, args(77, status.as_u64(), 0));
        assert_eq!(result, SyscallResult::Error(SyscallError::NoSuchChild));
    }

    #[test]
    fn fork_then_waitpid_through_dispatch() {
        let (machine, service, init) = boot();
        let service = Arc::new(service);
        let child_service = service.clone();
        let child_ctx = HostContext::new(move |current, ret| {
            assert_eq!(ret, 0);
            syscall_exit(&child_service, &current, args(7, 0, 0))
        });

        let child = match handle_syscall(&service, &init, &child_ctx, 0, SyscallArgs::default()) {
            SyscallResult::Success(pid) => pid,
            other => panic!("fork failed: {:?}", other),
        };
        assert_ne!(child, 0);

        let status = machine.user_slot(0);
        let result = handle_syscall(&service, &init, &child_ctx, 2, args(child, status.as_u64(), 0));
        assert_eq!(result, SyscallResult::Success(child));
        let raw = machine.read_user_i32(status).unwrap();
        assert_eq!(ExitStatus::from_raw(raw).code(), Some(7));
        machine.join_all();
    }
}
