// Execution context handed from a forking thread to its child
use x86_64::VirtAddr;

use crate::syscalls::{SyscallArgs, SyscallResult};

/// Register snapshot a new thread resumes from.
///
/// Fork clones the caller's snapshot into storage owned by the child's
/// thread, so the copy outlives the caller's kernel stack.
pub trait ForkContext: Clone + Send + 'static {
    /// Value the resumed thread sees as the result of its syscall
    fn set_return_value(&mut self, value: u64);
}

/// User register state saved on syscall entry (x86_64)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    pub rax: u64, // Syscall number in, result out
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: VirtAddr, // Already past the syscall instruction
    pub rsp: VirtAddr,
    pub rflags: u64,
    pub cs: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// Frame entering user code at `entry` with stack top `stack`
    pub fn new_user(entry: u64, stack: u64) -> Self {
        Self {
            rip: VirtAddr::new_truncate(entry),
            rsp: VirtAddr::new_truncate(stack),
            ..Self::default()
        }
    }

    pub fn syscall_number(&self) -> u64 {
        self.rax
    }

    /// Arguments in syscall register order
    pub fn syscall_args(&self) -> SyscallArgs {
        SyscallArgs {
            arg0: self.rdi,
            arg1: self.rsi,
            arg2: self.rdx,
            arg3: self.r10,
            arg4: self.r8,
            arg5: self.r9,
        }
    }

    /// Store a dispatcher result where user space expects it
    pub fn apply_result(&mut self, result: SyscallResult) {
        self.rax = u64::from(result);
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        Self {
            rax: 0, rbx: 0, rcx: 0, rdx: 0,
            rsi: 0, rdi: 0, rbp: 0,
            r8: 0, r9: 0, r10: 0, r11: 0,
            r12: 0, r13: 0, r14: 0, r15: 0,
            rip: VirtAddr::zero(),
            rsp: VirtAddr::zero(),
            rflags: 0x202, // RFLAGS with interrupt flag set
            cs: 0x23,      // User code, RPL 3
            ss: 0x1b,      // User data, RPL 3
        }
    }
}

impl ForkContext for TrapFrame {
    fn set_return_value(&mut self, value: u64) {
        self.rax = value;
    }
}
