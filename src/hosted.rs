// Thread-backed machine for running the process core on a host OS
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use log::{debug, error};
use spin::Mutex;

use crate::machine::{Machine, ThreadEntry, UserPtr};
use crate::process::context::{ForkContext, TrapFrame};
use crate::process::pcb::{ProcessError, ProcessRef};
use crate::sync::Parker;

/// Bytes of simulated user memory
pub const USER_MEMORY_SIZE: usize = 4096;

/// Pages a fresh address space starts with
const INITIAL_SPACE_SIZE: usize = 64;

/// Unwind payload that ends a process thread
struct ThreadExit;

/// Address space backed by a byte vector
#[derive(Debug)]
pub struct HostAddressSpace {
    id: u64,
    pages: Vec<u8>,
}

impl HostAddressSpace {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pages(&self) -> &[u8] {
        &self.pages
    }
}

/// Code a process runs after fork: `(current, fork return value)`.
///
/// It must finish by calling `ProcessService::exit`.
pub type Program = Arc<dyn Fn(ProcessRef<HostMachine>, u64) + Send + Sync>;

/// Saved registers plus the user code they resume into
#[derive(Clone)]
pub struct HostContext {
    pub frame: TrapFrame,
    pub program: Program,
}

impl HostContext {
    pub fn new<F>(program: F) -> Self
    where
        F: Fn(ProcessRef<HostMachine>, u64) + Send + Sync + 'static,
    {
        Self {
            frame: TrapFrame::default(),
            program: Arc::new(program),
        }
    }

    /// Context for callers that never fork from it
    pub fn idle() -> Self {
        Self::new(|current, _| panic!("[HOST] idle context resumed in process {}", current.pid()))
    }
}

impl ForkContext for HostContext {
    fn set_return_value(&mut self, value: u64) {
        self.frame.set_return_value(value);
    }
}

/// Host implementation of the kernel services the process core needs.
///
/// Every process thread is a real OS thread, address spaces are byte
/// vectors, and user memory is one shared buffer addressed by offset.
/// Switches let callers inject out-of-memory failures and stall copies.
pub struct HostMachine {
    next_space_id: AtomicU64,
    live_spaces: AtomicUsize,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    fail_next_copy: AtomicBool,
    fail_next_thread: AtomicBool,
    hold_copies: AtomicBool,
    copies_in_flight: AtomicUsize,
    blocks: AtomicUsize,
    user_memory: Mutex<Vec<u8>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    failures: Arc<Mutex<Vec<String>>>,
}

impl HostMachine {
    pub fn new() -> Self {
        Self {
            next_space_id: AtomicU64::new(1),
            live_spaces: AtomicUsize::new(0),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
            fail_next_copy: AtomicBool::new(false),
            fail_next_thread: AtomicBool::new(false),
            hold_copies: AtomicBool::new(false),
            copies_in_flight: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
            user_memory: Mutex::new(vec![0; USER_MEMORY_SIZE]),
            threads: Mutex::new(Vec::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fresh address space for a bootstrapped process
    pub fn new_address_space(&self) -> HostAddressSpace {
        self.live_spaces.fetch_add(1, Ordering::SeqCst);
        HostAddressSpace {
            id: self.next_space_id.fetch_add(1, Ordering::SeqCst),
            pages: vec![0; INITIAL_SPACE_SIZE],
        }
    }

    /// Address spaces created or copied and not yet destroyed
    pub fn live_address_spaces(&self) -> usize {
        self.live_spaces.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    /// Make the next `as_copy` report exhaustion
    pub fn fail_next_copy(&self) {
        self.fail_next_copy.store(true, Ordering::SeqCst);
    }

    /// Make the next `thread_fork` report exhaustion
    pub fn fail_next_thread(&self) {
        self.fail_next_thread.store(true, Ordering::SeqCst);
    }

    /// Stall every `as_copy` until `release_copies`
    pub fn hold_copies(&self) {
        self.hold_copies.store(true, Ordering::SeqCst);
    }

    pub fn release_copies(&self) {
        self.hold_copies.store(false, Ordering::SeqCst);
    }

    /// `as_copy` calls currently inside the machine
    pub fn copies_in_flight(&self) -> usize {
        self.copies_in_flight.load(Ordering::SeqCst)
    }

    /// Times any thread has parked through `Parker::block`
    pub fn blocked_waits(&self) -> usize {
        self.blocks.load(Ordering::SeqCst)
    }

    /// Word-aligned slot `index` in user memory
    pub fn user_slot(&self, index: usize) -> UserPtr {
        UserPtr::new(((index + 1) * 4) as u64)
    }

    pub fn read_user_i32(&self, ptr: UserPtr) -> Option<i32> {
        let start = Self::user_range(ptr, 4)?;
        let memory = self.user_memory.lock();
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&memory[start..start + 4]);
        Some(i32::from_ne_bytes(bytes))
    }

    /// Run `body` as the thread of an already bootstrapped process
    pub fn spawn_process<F>(&self, process: ProcessRef<HostMachine>, body: F)
    where
        F: FnOnce(ProcessRef<HostMachine>) + Send + 'static,
    {
        let name = process.name().to_string();
        let entry: ThreadEntry = Box::new(move || body(process));
        if let Err(err) = self.spawn_thread(&name, entry) {
            panic!("[HOST] could not start '{}': {}", name, err);
        }
    }

    /// Join every thread started so far, including ones started while joining.
    ///
    /// Panics if any process thread panicked for a reason other than exiting.
    pub fn join_all(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = core::mem::take(&mut *self.threads.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.join().is_err() {
                    self.failures.lock().push("thread wrapper panicked".to_string());
                }
            }
        }
        let failures = self.failures.lock().clone();
        assert!(failures.is_empty(), "process threads failed: {:?}", failures);
    }

    fn user_range(ptr: UserPtr, len: usize) -> Option<usize> {
        if ptr.is_null() {
            return None;
        }
        let start = usize::try_from(ptr.as_u64()).ok()?;
        let end = start.checked_add(len)?;
        if end > USER_MEMORY_SIZE {
            return None;
        }
        Some(start)
    }

    fn spawn_thread(&self, name: &str, entry: ThreadEntry) -> Result<(), ProcessError> {
        let failures = self.failures.clone();
        let label = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
                    if !payload.is::<ThreadExit>() {
                        let message = payload
                            .downcast_ref::<String>()
                            .cloned()
                            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                            .unwrap_or_else(|| "non-string panic".to_string());
                        error!("[HOST] thread '{}' panicked: {}", label, message);
                        failures.lock().push(message);
                    }
                }
            })
            .map_err(|_| ProcessError::OutOfMemory)?;
        self.threads.lock().push(handle);
        Ok(())
    }
}

impl Default for HostMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Parker for HostMachine {
    type Waker = Thread;

    fn current_waker(&self) -> Thread {
        thread::current()
    }

    fn block(&self) {
        self.blocks.fetch_add(1, Ordering::SeqCst);
        thread::park();
    }

    fn wake(&self, waker: &Thread) {
        waker.unpark();
    }
}

impl Machine for HostMachine {
    type AddressSpace = HostAddressSpace;
    type Context = HostContext;

    fn as_copy(&self, src: &HostAddressSpace) -> Option<HostAddressSpace> {
        if self.fail_next_copy.swap(false, Ordering::SeqCst) {
            return None;
        }
        self.copies_in_flight.fetch_add(1, Ordering::SeqCst);
        while self.hold_copies.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        self.copies_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.live_spaces.fetch_add(1, Ordering::SeqCst);
        Some(HostAddressSpace {
            id: self.next_space_id.fetch_add(1, Ordering::SeqCst),
            pages: src.pages.clone(),
        })
    }

    fn as_activate(&self, _space: &HostAddressSpace) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn as_deactivate(&self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    fn as_destroy(&self, space: HostAddressSpace) {
        debug!("[HOST] destroying address space {}", space.id);
        self.live_spaces.fetch_sub(1, Ordering::SeqCst);
    }

    fn thread_fork(&self, name: &str, entry: ThreadEntry) -> Result<(), ProcessError> {
        if self.fail_next_thread.swap(false, Ordering::SeqCst) {
            return Err(ProcessError::OutOfMemory);
        }
        self.spawn_thread(name, entry)
    }

    fn thread_exit(&self) -> ! {
        panic::resume_unwind(Box::new(ThreadExit))
    }

    fn copyout(&self, src: &[u8], dest: UserPtr) -> Result<(), ProcessError> {
        let start = Self::user_range(dest, src.len()).ok_or(ProcessError::FaultOnCopy)?;
        self.user_memory.lock()[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn enter_forked_process(&self, current: ProcessRef<HostMachine>, context: HostContext) -> ! {
        let pid = current.pid();
        (context.program)(current, context.frame.rax);
        panic!("[HOST] process {} returned from user code without exiting", pid)
    }
}
