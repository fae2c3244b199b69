//! PIT (Programmable Interval Timer) 드라이버
//!
//! 이 모듈은 x86 PIT를 사용하여 시스템 타이머를 구현합니다.
//! PIT는 1.193182 MHz의 고정 클럭을 사용하며, 분주기를 통해 원하는 주파수로 설정할 수 있습니다.
//!
//! 분주기는 정수이므로 실제 주파수는 요청값과 조금 다를 수 있습니다.
//! 틱 ↔ 시간 변환은 항상 실제 주파수를 씁니다.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::arch::{Cpu, PortIo};
use crate::interrupts::pic::PIC1_OFFSET;
use crate::interrupts::Registers;
use crate::kernel::Kernel;

/// PIT I/O 포트 주소
const PIT_CHANNEL0_DATA: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte, Mode 3 (Square Wave), Binary
const PIT_MODE_SQUARE_WAVE: u8 = 0x36;

/// PIT 기본 클럭 주파수 (Hz)
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;

/// 주파수 0 요청 시 사용하는 값
pub const DEFAULT_FREQUENCY_HZ: u32 = 100;

/// 타이머 PIC 라인과 벡터
pub const TIMER_IRQ_LINE: u8 = 0;
pub const TIMER_VECTOR: u8 = PIC1_OFFSET + TIMER_IRQ_LINE;

/// 틱 카운터와 실제 주파수
///
/// 틱은 타이머 인터럽트에서만 증가하고, 나머지 코드는 읽기만 합니다.
pub struct Timer {
    ticks: AtomicU64,
    frequency_hz: AtomicU32,
}

impl Timer {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency_hz: AtomicU32::new(0),
        }
    }

    /// 요청 주파수의 분주기 (1..=0xFFFF로 제한)
    pub fn divisor_for(frequency_hz: u32) -> u16 {
        let frequency_hz = if frequency_hz == 0 {
            DEFAULT_FREQUENCY_HZ
        } else {
            frequency_hz
        };
        let divisor = (PIT_BASE_FREQUENCY / frequency_hz).clamp(1, u32::from(u16::MAX));
        divisor as u16
    }

    /// PIT 채널 0 프로그래밍
    ///
    /// 틱 카운터를 0으로 되돌리고 실제 주파수를 돌려줍니다.
    /// 핸들러 등록과 라인 마스크 해제는 `Kernel::configure_timer`가 합니다.
    pub fn configure(&self, ports: &impl PortIo, frequency_hz: u32) -> u32 {
        let divisor = Self::divisor_for(frequency_hz);

        ports.write_byte(PIT_COMMAND, PIT_MODE_SQUARE_WAVE);
        // 분주기 값 전송 (먼저 하위 바이트, 그 다음 상위 바이트)
        ports.write_byte(PIT_CHANNEL0_DATA, (divisor & 0xFF) as u8);
        ports.write_byte(PIT_CHANNEL0_DATA, (divisor >> 8) as u8);

        let actual = PIT_BASE_FREQUENCY / u32::from(divisor);
        self.ticks.store(0, Ordering::Release);
        self.frequency_hz.store(actual, Ordering::Release);

        crate::log_info!(
            "PIT initialized: {} Hz requested, {} Hz actual (divisor: {})",
            frequency_hz,
            actual,
            divisor
        );
        actual
    }

    /// 틱 하나 증가 (타이머 인터럽트 전용)
    pub(crate) fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// 실제 주파수 (미설정이면 0)
    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz.load(Ordering::Acquire)
    }

    /// 최소 `ticks`틱이 지날 때까지 `idle`을 반복 호출
    pub fn sleep_ticks(&self, ticks: u64, mut idle: impl FnMut()) {
        let target = self.ticks().saturating_add(ticks);
        while self.ticks() < target {
            idle();
        }
    }

    /// 밀리초 → 틱
    ///
    /// `ms × 주파수`가 0이 아니면 최소 1틱입니다.
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        let product = ms.saturating_mul(u64::from(self.frequency_hz()));
        if product == 0 {
            0
        } else {
            (product / 1000).max(1)
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        match self.frequency_hz() {
            0 => 0,
            hz => self.ticks() / u64::from(hz),
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// 타이머 인터럽트 핸들러
///
/// 이 함수는 인터럽트 컨텍스트에서 실행되므로 빠르게 처리해야 합니다.
pub(crate) fn handle_tick<P: PortIo, C: Cpu>(kernel: &Kernel<P, C>, _regs: &Registers) {
    kernel.timer().tick();
}
