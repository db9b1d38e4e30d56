// Shared setup for the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use emos_proc::hosted::{HostContext, HostMachine};
use emos_proc::{ExitStatus, ProcessConfig, ProcessId, ProcessRef, ProcessService, ProcessState, UserPtr};

pub type Service = Arc<ProcessService<HostMachine>>;

pub struct Kernel {
    pub machine: Arc<HostMachine>,
    pub service: Service,
    pub init: ProcessRef<HostMachine>,
}

pub fn boot() -> Kernel {
    boot_with(ProcessConfig::default())
}

pub fn boot_with(config: ProcessConfig) -> Kernel {
    let machine = Arc::new(HostMachine::new());
    let service = Arc::new(ProcessService::new(machine.clone(), config).unwrap());
    let init = service.bootstrap("init", machine.new_address_space()).unwrap();
    Kernel { machine, service, init }
}

/// Child program that exits with `code` as soon as it runs
pub fn exiting_with(service: &Service, code: i32) -> HostContext {
    let service = service.clone();
    HostContext::new(move |current, ret| {
        assert_eq!(ret, 0, "child must see fork return 0");
        service.exit(current, code)
    })
}

/// Poll until `pid` reaches `state` (or leaves the table, for `Reaped`)
pub fn wait_for_state(service: &Service, pid: ProcessId, state: ProcessState) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let current = service.lookup(pid).map(|pcb| pcb.state());
        match current {
            Some(s) if s == state => return,
            None if state == ProcessState::Reaped => return,
            _ => {}
        }
        assert!(Instant::now() < deadline, "pid {} stuck in {:?}", pid, current);
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn exit_code_at(machine: &HostMachine, slot: UserPtr) -> Option<i32> {
    machine
        .read_user_i32(slot)
        .and_then(|raw| ExitStatus::from_raw(raw).code())
}

/// Poll until `done` holds
pub fn spin_until(done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "condition never became true");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Child that exits with `code` once `go` is raised
pub fn held_until(service: &Service, go: &Arc<AtomicBool>, code: i32) -> HostContext {
    let service = service.clone();
    let go = go.clone();
    HostContext::new(move |current, _| {
        spin_until(|| go.load(Ordering::SeqCst));
        service.exit(current, code)
    })
}
