//! 커널 컨텍스트
//!
//! 포트, CPU, PIC, IDT, 핸들러 레지스트리, 타이머, 키보드, 힙을 한 곳에 묶습니다.
//! `const fn new`로 만들 수 있으므로 커널 이미지에서는 평범한 `static`으로 둡니다.
//!
//! 초기화 순서 (`start`):
//! 힙 → PIC 리매핑 → IDT 채우기/적재 → 레지스트리 초기화 → 타이머/키보드 → 인터럽트 활성화

mod error;

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::{Mutex, Once};
use x86_64::structures::gdt::SegmentSelector;

use crate::arch::{Cpu, PortIo};
use crate::config::KernelConfig;
use crate::drivers::keyboard::{self, Keyboard, KEYBOARD_IRQ_LINE, KEYBOARD_VECTOR};
use crate::drivers::timer::{self, Timer, TIMER_IRQ_LINE, TIMER_VECTOR};
use crate::interrupts::idt::{
    EntryPoints, GateAttributes, InterruptTable, KERNEL_CODE_SELECTOR,
};
use crate::interrupts::pic::{ChainedPics, IRQ_LINES};
use crate::interrupts::{FaultReport, HandlerRegistry, Registers, Route};
use crate::memory::{BumpHeap, HeapError};
use crate::{log_error, log_info};

pub use error::KernelError;

/// 인터럽트 핸들러
///
/// 인터럽트 컨텍스트에서 실행되므로 짧게 끝나야 하고, 블로킹하면 안 됩니다.
pub type InterruptHandler<P, C> = fn(&Kernel<P, C>, &Registers);

/// 부트 코드가 넘겨주는 정보
#[derive(Debug, Clone, Copy)]
pub struct BootLayout {
    /// 링커 심볼 `kernel_end`의 주소
    pub kernel_end: usize,
    /// 어셈블리 트램펄린 주소
    pub entry_points: EntryPoints,
}

/// 진단용 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStats {
    pub ticks: u64,
    pub timer_frequency_hz: u32,
    pub uptime_seconds: u64,
    pub pending_keys: usize,
    pub dropped_keys: u32,
    pub heap_start: usize,
    pub heap_total: usize,
    pub heap_used: usize,
    pub heap_free: usize,
    /// PIC 라인별 디스패치 횟수
    pub irq_counts: [u32; IRQ_LINES as usize],
}

pub struct Kernel<P: PortIo, C: Cpu> {
    ports: P,
    cpu: C,
    config: KernelConfig,
    pics: ChainedPics,
    table: Mutex<InterruptTable>,
    registry: HandlerRegistry<InterruptHandler<P, C>>,
    timer: Timer,
    keyboard: Keyboard,
    heap: &'static BumpHeap,
    fault: Once<FaultReport>,
    started: AtomicBool,
}

impl<P: PortIo, C: Cpu> Kernel<P, C> {
    pub const fn new(ports: P, cpu: C, heap: &'static BumpHeap, config: KernelConfig) -> Self {
        Self {
            ports,
            cpu,
            config,
            pics: ChainedPics::legacy_remap(),
            table: Mutex::new(InterruptTable::new()),
            registry: HandlerRegistry::new(),
            timer: Timer::new(),
            keyboard: Keyboard::new(),
            heap,
            fault: Once::new(),
            started: AtomicBool::new(false),
        }
    }

    /// 커널 코어 초기화
    ///
    /// `'static` 수신자를 요구하므로 IDT 주소는 커널 수명 동안 고정됩니다.
    pub fn start(&'static self, boot: &BootLayout) -> Result<(), KernelError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(KernelError::AlreadyStarted);
        }

        self.cpu.disable_interrupts();

        self.heap.init(boot.kernel_end, self.config.heap_size)?;
        self.pics.initialize(&self.ports);

        {
            let mut table = self.table.lock();
            table.populate(
                &boot.entry_points,
                KERNEL_CODE_SELECTOR,
                GateAttributes::KERNEL_INTERRUPT,
            );
            // SAFETY: `self`가 'static이므로 테이블은 움직이지 않습니다.
            unsafe { table.activate(&self.cpu)? };
        }

        self.registry.clear();
        self.configure_timer(self.config.timer_frequency_hz);
        self.initialize_keyboard();

        self.cpu.enable_interrupts();
        log_info!("Interrupts enabled");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// 트램펄린 진입점
    pub fn dispatch(&self, regs: &Registers) {
        match self.registry.route(regs, &self.pics) {
            Route::Fatal(report) => self.fatal(report),
            Route::Deliver {
                handler,
                acknowledge,
            } => {
                if let Some(handler) = handler {
                    handler(self, regs);
                }
                if let Some(line) = acknowledge {
                    self.pics.acknowledge(&self.ports, line);
                }
            }
        }
    }

    fn fatal(&self, report: FaultReport) -> ! {
        self.cpu.disable_interrupts();
        crate::logging::enter_fatal();
        let report = *self.fault.call_once(|| report);

        log_error!("==== CPU EXCEPTION ====");
        log_error!("Vector: {} ({})", report.vector, report.name);
        log_error!("Error code: {:#010x}", report.error_code);
        log_error!("EIP: {:#010x}", report.instruction_pointer);
        log_error!("System halted.");
        crate::logging::dump_recent();

        self.cpu.park()
    }

    /// 벡터에 핸들러 등록 (덮어쓰기)
    ///
    /// 벡터 0-31에 등록한 핸들러는 호출되지 않습니다.
    /// 디스패치 트램펄린은 벡터 0-47에만 있고 48 이상은 기본 `iret` 게이트로 가므로,
    /// 그 벡터의 핸들러는 `install_gate`로 게이트를 바꾸기 전에는 실행되지 않습니다.
    pub fn register(&self, vector: u8, handler: InterruptHandler<P, C>) {
        self.cpu
            .without_interrupts(|| self.registry.register(vector, handler));
    }

    /// 살아 있는 IDT의 게이트 하나 교체
    pub fn install_gate(
        &self,
        vector: u8,
        handler: u32,
        selector: SegmentSelector,
        attributes: GateAttributes,
    ) {
        self.cpu.without_interrupts(|| {
            self.table
                .lock()
                .install(vector, handler, selector, attributes)
        });
    }

    /// PIC 라인 마스크 설정
    pub fn set_line_enabled(&self, line: u8, enabled: bool) {
        self.cpu
            .without_interrupts(|| self.pics.set_mask(&self.ports, line, enabled));
    }

    /// PIT 재설정 + 틱 핸들러 등록 + 라인 0 해제. 실제 주파수를 돌려줍니다.
    pub fn configure_timer(&self, frequency_hz: u32) -> u32 {
        let actual = self
            .cpu
            .without_interrupts(|| self.timer.configure(&self.ports, frequency_hz));
        self.register(TIMER_VECTOR, timer::handle_tick::<P, C>);
        self.set_line_enabled(TIMER_IRQ_LINE, true);
        actual
    }

    /// 키보드 상태 초기화 + 핸들러 등록 + 라인 1 해제
    pub fn initialize_keyboard(&self) {
        self.cpu.without_interrupts(|| self.keyboard.reset());
        self.register(KEYBOARD_VECTOR, keyboard::handle_interrupt::<P, C>);
        self.set_line_enabled(KEYBOARD_IRQ_LINE, true);
        log_info!("Keyboard driver initialized");
    }

    pub fn ticks(&self) -> u64 {
        self.timer.ticks()
    }

    pub fn actual_frequency_hz(&self) -> u32 {
        self.timer.frequency_hz()
    }

    /// 최소 `ticks`틱 동안 대기 (매 반복마다 `hlt`)
    pub fn sleep_ticks(&self, ticks: u64) {
        self.timer
            .sleep_ticks(ticks, || self.cpu.wait_for_interrupt());
    }

    pub fn sleep_ms(&self, ms: u64) {
        self.sleep_ticks(self.timer.ms_to_ticks(ms));
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.timer.uptime_seconds()
    }

    pub fn has_char(&self) -> bool {
        self.keyboard.has_char()
    }

    /// 문자가 들어올 때까지 대기 (타임아웃 없음)
    pub fn get_char(&self) -> char {
        self.keyboard.get_char(|| self.cpu.wait_for_interrupt())
    }

    pub fn try_get_char(&self) -> Option<char> {
        self.keyboard.try_get_char()
    }

    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.heap.allocate(size)
    }

    pub fn allocate_aligned(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, HeapError> {
        self.heap.allocate_aligned(size, alignment)
    }

    pub fn heap(&self) -> &BumpHeap {
        self.heap
    }

    /// 치명적 예외 기록 (있다면)
    pub fn last_fault(&self) -> Option<FaultReport> {
        self.fault.get().copied()
    }

    pub fn dispatch_count(&self, vector: u8) -> u32 {
        self.registry.dispatch_count(vector)
    }

    pub fn stats(&self) -> KernelStats {
        let mut irq_counts = [0u32; IRQ_LINES as usize];
        for (line, count) in (0u8..).zip(irq_counts.iter_mut()) {
            if let Some(vector) = self.pics.vector_for_line(line) {
                *count = self.registry.dispatch_count(vector);
            }
        }

        KernelStats {
            ticks: self.ticks(),
            timer_frequency_hz: self.actual_frequency_hz(),
            uptime_seconds: self.uptime_seconds(),
            pending_keys: self.keyboard.pending(),
            dropped_keys: self.keyboard.dropped(),
            heap_start: self.heap.start_address(),
            heap_total: self.heap.total_capacity(),
            heap_used: self.heap.used_bytes(),
            heap_free: self.heap.free_bytes(),
            irq_counts,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub(crate) fn timer(&self) -> &Timer {
        &self.timer
    }

    pub(crate) fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }
}
