//! 하드웨어 캐퍼빌리티
//!
//! 포트 I/O와 CPU 제어를 좁은 트레이트 두 개로 감쌉니다.
//! 커널 이미지는 `x86` 백엔드를 쓰고, 호스트 테스트는 `fake` 백엔드를 씁니다.

use crate::interrupts::idt::TablePointer;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod x86;

#[cfg(test)]
pub mod fake;

/// I/O 대기용 포트 (POST 진단 포트, 쓰기만 하면 됨)
pub const IO_WAIT_PORT: u16 = 0x80;

/// 바이트 단위 포트 I/O
///
/// 구현체를 만드는 쪽이 링 0 실행을 보장합니다.
/// 메서드 자체는 안전하게 노출합니다.
pub trait PortIo {
    /// 포트에서 1바이트 읽기
    fn read_byte(&self, port: u16) -> u8;

    /// 포트에 1바이트 쓰기
    fn write_byte(&self, port: u16, value: u8);

    /// 느린 장치(PIC 등)를 위한 짧은 버스 대기
    fn io_wait(&self) {
        self.write_byte(IO_WAIT_PORT, 0);
    }
}

impl<T: PortIo + ?Sized> PortIo for &T {
    fn read_byte(&self, port: u16) -> u8 {
        (**self).read_byte(port)
    }

    fn write_byte(&self, port: u16, value: u8) {
        (**self).write_byte(port, value)
    }

    fn io_wait(&self) {
        (**self).io_wait()
    }
}

/// CPU 제어 (인터럽트 플래그, 정지, IDT 적재)
pub trait Cpu {
    fn enable_interrupts(&self);

    fn disable_interrupts(&self);

    fn interrupts_enabled(&self) -> bool;

    /// 다음 인터럽트까지 프로세서를 양보 (`hlt`)
    fn wait_for_interrupt(&self);

    /// 인터럽트를 끈 채로 영원히 정지
    fn park(&self) -> !;

    /// IDT 레지스터 적재
    ///
    /// # Safety
    ///
    /// `pointer`가 가리키는 테이블은 커널이 살아 있는 동안 같은 주소에 남아 있어야 합니다.
    unsafe fn load_interrupt_table(&self, pointer: &TablePointer);

    /// 인터럽트를 잠시 끈 상태로 `f` 실행
    ///
    /// 진입 시 인터럽트가 켜져 있었을 때만 다시 켭니다.
    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        let was_enabled = self.interrupts_enabled();
        if was_enabled {
            self.disable_interrupts();
        }
        let result = f();
        if was_enabled {
            self.enable_interrupts();
        }
        result
    }
}
