//! 인터럽트 디스패치
//!
//! 트램펄린이 저장한 레지스터 스냅샷을 받아 경로를 정합니다.
//!
//! - 벡터 0-31 (CPU 예외): 치명적. 핸들러가 등록되어 있어도 부르지 않습니다.
//! - 그 외: 등록된 핸들러를 부르고, PIC 라인이면 핸들러가 끝난 뒤 EOI를 보냅니다.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use super::pic::ChainedPics;

/// CPU 예외 벡터 수
pub const EXCEPTION_VECTORS: u8 = 32;

/// 벡터 수
pub const VECTOR_COUNT: usize = 256;

/// 트램펄린이 스택에 남기는 레지스터 스냅샷
///
/// 필드 순서는 트램펄린의 push 순서를 거꾸로 읽은 것입니다.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub int_no: u32,
    pub err_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

impl Registers {
    /// 소프트웨어로 인터럽트를 흉내 낼 때 쓰는 스냅샷
    pub fn for_vector(vector: u8, error_code: u32) -> Self {
        Self {
            int_no: u32::from(vector),
            err_code: error_code,
            ..Self::default()
        }
    }

    pub fn vector(&self) -> u8 {
        (self.int_no & 0xFF) as u8
    }
}

/// CPU 예외 이름 (벡터 0-31)
pub static EXCEPTION_NAMES: [&str; EXCEPTION_VECTORS as usize] = [
    "Divide By Zero",
    "Debug",
    "Non Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating Point",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating Point",
    "Virtualization",
    "Control Protection",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

pub fn exception_name(vector: u8) -> &'static str {
    EXCEPTION_NAMES
        .get(usize::from(vector))
        .copied()
        .unwrap_or("Reserved")
}

/// 치명적 예외 기록
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultReport {
    pub vector: u8,
    pub error_code: u32,
    pub name: &'static str,
    pub instruction_pointer: u32,
}

impl FaultReport {
    pub fn from_registers(regs: &Registers) -> Self {
        let vector = regs.vector();
        Self {
            vector,
            error_code: regs.err_code,
            name: exception_name(vector),
            instruction_pointer: regs.eip,
        }
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (vector {}, error code {:#x}) at {:#010x}",
            self.name, self.vector, self.error_code, self.instruction_pointer
        )
    }
}

/// 디스패치 결정
#[derive(Debug, Clone, Copy)]
pub enum Route<H> {
    /// CPU 예외: 보고 후 정지
    Fatal(FaultReport),
    /// 핸들러(있으면) 실행 후 PIC 라인(있으면) EOI
    Deliver { handler: Option<H>, acknowledge: Option<u8> },
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO_COUNT: AtomicU32 = AtomicU32::new(0);

/// 벡터별 핸들러 레지스트리
///
/// 벡터당 핸들러는 최대 하나이며, 다시 등록하면 덮어씁니다.
/// 핸들러는 잠금 안에서 복사해 꺼낸 뒤 잠금 밖에서 호출합니다.
pub struct HandlerRegistry<H: Copy> {
    slots: Mutex<[Option<H>; VECTOR_COUNT]>,
    counts: [AtomicU32; VECTOR_COUNT],
}

impl<H: Copy> HandlerRegistry<H> {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new([None; VECTOR_COUNT]),
            counts: [ZERO_COUNT; VECTOR_COUNT],
        }
    }

    pub fn register(&self, vector: u8, handler: H) {
        self.slots.lock()[usize::from(vector)] = Some(handler);
    }

    pub fn handler(&self, vector: u8) -> Option<H> {
        self.slots.lock()[usize::from(vector)]
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, vector: u8) -> bool {
        self.handler(vector).is_some()
    }

    /// 모든 핸들러와 카운터 초기화
    pub fn clear(&self) {
        *self.slots.lock() = [None; VECTOR_COUNT];
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }

    /// 벡터가 디스패치된 횟수
    pub fn dispatch_count(&self, vector: u8) -> u32 {
        self.counts[usize::from(vector)].load(Ordering::Relaxed)
    }

    /// 디스패치 경로 결정 (카운터 증가 포함)
    pub fn route(&self, regs: &Registers, pics: &ChainedPics) -> Route<H> {
        let vector = regs.vector();
        self.counts[usize::from(vector)].fetch_add(1, Ordering::Relaxed);

        if vector < EXCEPTION_VECTORS {
            return Route::Fatal(FaultReport::from_registers(regs));
        }

        Route::Deliver {
            handler: self.handler(vector),
            acknowledge: pics.line_for_vector(vector),
        }
    }
}

impl<H: Copy> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestHandler = fn() -> u32;

    fn one() -> u32 {
        1
    }

    fn two() -> u32 {
        2
    }

    #[test]
    fn registers_layout_matches_trampoline_frame() {
        assert_eq!(core::mem::size_of::<Registers>(), 19 * 4);
        assert_eq!(core::mem::offset_of!(Registers, int_no), 12 * 4);
        assert_eq!(core::mem::offset_of!(Registers, eip), 14 * 4);
    }

    #[test]
    fn exception_names() {
        assert_eq!(exception_name(0), "Divide By Zero");
        assert_eq!(exception_name(13), "General Protection Fault");
        assert_eq!(exception_name(14), "Page Fault");
        assert_eq!(exception_name(21), "Control Protection");
        assert_eq!(exception_name(22), "Reserved");
        assert_eq!(exception_name(200), "Reserved");
    }

    #[test]
    fn register_overwrites_previous_handler() {
        let registry: HandlerRegistry<TestHandler> = HandlerRegistry::new();
        registry.register(40, one);
        registry.register(40, two);

        let handler = registry.handler(40).expect("handler registered");
        assert_eq!(handler(), 2);
        assert!(!registry.is_registered(41));
    }

    #[test]
    fn exceptions_route_fatal_even_with_handler() {
        let registry: HandlerRegistry<TestHandler> = HandlerRegistry::new();
        let pics = ChainedPics::legacy_remap();
        registry.register(14, one);

        let mut regs = Registers::for_vector(14, 0x2);
        regs.eip = 0xC0DE;

        match registry.route(&regs, &pics) {
            Route::Fatal(report) => {
                assert_eq!(report.vector, 14);
                assert_eq!(report.error_code, 0x2);
                assert_eq!(report.name, "Page Fault");
                assert_eq!(report.instruction_pointer, 0xC0DE);
            }
            other => panic!("unexpected route: {:?}", other.acknowledge_line()),
        }
    }

    #[test]
    fn pic_lines_are_acknowledged() {
        let registry: HandlerRegistry<TestHandler> = HandlerRegistry::new();
        let pics = ChainedPics::legacy_remap();

        for vector in 32..48u8 {
            let route = registry.route(&Registers::for_vector(vector, 0), &pics);
            assert_eq!(route.acknowledge_line(), Some(vector - 32));
        }

        let route = registry.route(&Registers::for_vector(0x80, 0), &pics);
        assert_eq!(route.acknowledge_line(), None);
        assert_eq!(registry.dispatch_count(0x80), 1);
        assert_eq!(registry.dispatch_count(33), 1);
    }

    #[test]
    fn clear_drops_handlers_and_counts() {
        let registry: HandlerRegistry<TestHandler> = HandlerRegistry::new();
        let pics = ChainedPics::legacy_remap();
        registry.register(33, one);
        registry.route(&Registers::for_vector(33, 0), &pics);

        registry.clear();
        assert!(!registry.is_registered(33));
        assert_eq!(registry.dispatch_count(33), 0);
    }

    impl<H> Route<H> {
        fn acknowledge_line(&self) -> Option<u8> {
            match self {
                Route::Deliver { acknowledge, .. } => *acknowledge,
                Route::Fatal(_) => None,
            }
        }
    }
}
