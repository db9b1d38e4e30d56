// Process subsystem configuration for EMOS
use crate::process::pcb::{ProcessError, ProcessId};

/// Lowest pid handed out by default (0 is what fork returns in the child)
pub const DEFAULT_PID_MIN: ProcessId = 1;

/// Highest pid handed out by default
pub const DEFAULT_PID_MAX: ProcessId = 32767;

/// Upper bound for any configured pid; user space sees pids as a signed 32-bit value
pub const PID_LIMIT: ProcessId = i32::MAX as ProcessId;

/// Tunables for the process table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessConfig {
    /// First pid the allocator hands out
    pub pid_min: ProcessId,
    /// Last pid the allocator hands out before it falls back to recycled ids
    pub pid_max: ProcessId,
}

impl ProcessConfig {
    pub fn new(pid_min: ProcessId, pid_max: ProcessId) -> Result<Self, ProcessError> {
        let config = Self { pid_min, pid_max };
        config.validate()?;
        Ok(config)
    }

    /// Reject ranges that would hand out pid 0 or run past `PID_LIMIT`
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.pid_min == 0 || self.pid_min > self.pid_max || self.pid_max > PID_LIMIT {
            return Err(ProcessError::InvalidArgument);
        }
        Ok(())
    }

    /// Number of distinct pids in the configured range; 0 for an inverted one
    pub fn pid_capacity(&self) -> u64 {
        self.pid_max
            .checked_sub(self.pid_min)
            .map_or(0, |span| span.saturating_add(1))
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            pid_min: DEFAULT_PID_MIN,
            pid_max: DEFAULT_PID_MAX,
        }
    }
}
