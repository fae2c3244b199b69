//! 호스트 테스트용 가짜 하드웨어
//!
//! `FakePorts`는 모든 쓰기를 기록하고, 포트별로 예약된 읽기 값을 돌려줍니다.
//! 예약된 값이 없으면 그 포트에 마지막으로 쓴 값을 돌려줍니다 (PIC 마스크 레지스터처럼 동작).
//! `FakeCpu`는 인터럽트 플래그와 적재된 IDT 포인터를 기록하고, `park`에서 패닉합니다.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::vec::Vec;

use super::{Cpu, PortIo, IO_WAIT_PORT};
use crate::interrupts::idt::TablePointer;

/// `park` 패닉 메시지
pub const PARKED: &str = "cpu parked";

#[derive(Default)]
pub struct FakePorts {
    writes: Mutex<Vec<(u16, u8)>>,
    scripted: Mutex<VecDeque<(u16, u8)>>,
    latched: Mutex<HashMap<u16, u8>>,
}

impl FakePorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// `port`의 다음 읽기가 `value`를 돌려주도록 예약
    pub fn script_read(&self, port: u16, value: u8) {
        self.scripted.lock().unwrap().push_back((port, value));
    }

    /// 지금까지의 모든 쓰기 (I/O 대기 포트 제외)
    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|&(port, _)| port != IO_WAIT_PORT)
            .collect()
    }

    pub fn writes_to(&self, port: u16) -> Vec<u8> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|&&(p, _)| p == port)
            .map(|&(_, value)| value)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }
}

impl PortIo for FakePorts {
    fn read_byte(&self, port: u16) -> u8 {
        let mut scripted = self.scripted.lock().unwrap();
        if let Some(index) = scripted.iter().position(|&(p, _)| p == port) {
            if let Some((_, value)) = scripted.remove(index) {
                return value;
            }
        }
        self.latched.lock().unwrap().get(&port).copied().unwrap_or(0)
    }

    fn write_byte(&self, port: u16, value: u8) {
        self.writes.lock().unwrap().push((port, value));
        self.latched.lock().unwrap().insert(port, value);
    }
}

type WaitHook = Box<dyn Fn() + Send>;

#[derive(Default)]
pub struct FakeCpu {
    enabled: AtomicBool,
    loaded: Mutex<Option<TablePointer>>,
    waits: AtomicUsize,
    on_wait: Mutex<Option<WaitHook>>,
}

impl FakeCpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded_table(&self) -> Option<TablePointer> {
        *self.loaded.lock().unwrap()
    }

    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    /// `wait_for_interrupt`마다 실행할 동작 (보통 가짜 타이머/키보드 인터럽트)
    pub fn on_wait(&self, hook: impl Fn() + Send + 'static) {
        *self.on_wait.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Cpu for FakeCpu {
    fn enable_interrupts(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn disable_interrupts(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn interrupts_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn wait_for_interrupt(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_wait.lock().unwrap().as_ref() {
            hook();
        }
    }

    fn park(&self) -> ! {
        self.disable_interrupts();
        panic!("{}", PARKED);
    }

    unsafe fn load_interrupt_table(&self, pointer: &TablePointer) {
        *self.loaded.lock().unwrap() = Some(*pointer);
    }
}
