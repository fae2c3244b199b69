//! 보호 모드(i686) 하드웨어 백엔드
//!
//! `in`/`out`, 인터럽트 플래그, `hlt`, `lidt`를 인라인 어셈블리로 구현하고
//! 벡터별 진입 트램펄린을 제공합니다.
//!
//! 트램펄린은 에러 코드가 없는 벡터에 0을 채워 넣고 벡터 번호를 push한 뒤
//! 범용/세그먼트 레지스터를 저장하고 `edu_interrupt_dispatch(&Registers)`를 호출합니다.
//! 이 심볼은 커널 이미지가 정의합니다.

use core::arch::{asm, global_asm};

use super::{Cpu, PortIo};
use crate::interrupts::idt::{EntryPoints, TablePointer, ROUTED_VECTORS};

/// EFLAGS.IF
const EFLAGS_INTERRUPT_FLAG: u32 = 1 << 9;

/// 실제 I/O 포트
#[derive(Debug)]
pub struct HardwarePorts {
    _private: (),
}

impl HardwarePorts {
    /// # Safety
    ///
    /// 링 0에서 실행 중일 때만 생성해야 합니다.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PortIo for HardwarePorts {
    #[inline]
    fn read_byte(&self, port: u16) -> u8 {
        let value: u8;
        // SAFETY: 생성자가 링 0 실행을 보장합니다.
        unsafe {
            asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    #[inline]
    fn write_byte(&self, port: u16, value: u8) {
        // SAFETY: 생성자가 링 0 실행을 보장합니다.
        unsafe {
            asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }
}

/// 실제 CPU
#[derive(Debug)]
pub struct HardwareCpu {
    _private: (),
}

impl HardwareCpu {
    /// # Safety
    ///
    /// 링 0에서 실행 중일 때만 생성해야 합니다.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Cpu for HardwareCpu {
    #[inline]
    fn enable_interrupts(&self) {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }

    #[inline]
    fn disable_interrupts(&self) {
        unsafe { asm!("cli", options(nomem, nostack)) };
    }

    fn interrupts_enabled(&self) -> bool {
        let flags: u32;
        unsafe { asm!("pushfd", "pop {}", out(reg) flags, options(nomem, preserves_flags)) };
        flags & EFLAGS_INTERRUPT_FLAG != 0
    }

    #[inline]
    fn wait_for_interrupt(&self) {
        unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
    }

    fn park(&self) -> ! {
        loop {
            unsafe { asm!("cli", "hlt", options(nomem, nostack)) };
        }
    }

    unsafe fn load_interrupt_table(&self, pointer: &TablePointer) {
        asm!("lidt [{}]", in(reg) pointer, options(readonly, nostack, preserves_flags));
    }
}

// 에러 코드를 push하는 예외: 8, 10-14, 17, 21, 29, 30
global_asm!(
    r#"
.macro EDU_ISR_NOERR n
.global edu_isr_\n
edu_isr_\n:
    push 0
    push \n
    jmp edu_interrupt_common
.endm

.macro EDU_ISR_ERR n
.global edu_isr_\n
edu_isr_\n:
    push \n
    jmp edu_interrupt_common
.endm

.section .text
.irp n, 0,1,2,3,4,5,6,7,9,15,16,18,19,20,22,23,24,25,26,27,28,31
    EDU_ISR_NOERR \n
.endr
.irp n, 8,10,11,12,13,14,17,21,29,30
    EDU_ISR_ERR \n
.endr
.irp n, 32,33,34,35,36,37,38,39,40,41,42,43,44,45,46,47
    EDU_ISR_NOERR \n
.endr

edu_interrupt_common:
    pushad
    push ds
    push es
    push fs
    push gs
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    push esp
    call edu_interrupt_dispatch
    add esp, 4
    pop gs
    pop fs
    pop es
    pop ds
    popad
    add esp, 8
    iretd

.global edu_default_trampoline
edu_default_trampoline:
    iretd
"#
);

macro_rules! routed_trampolines {
    ($($name:ident),* $(,)?) => {
        extern "C" {
            fn edu_default_trampoline();
            $(fn $name();)*
        }

        fn routed_addresses() -> [u32; ROUTED_VECTORS] {
            [$($name as usize as u32),*]
        }
    };
}

routed_trampolines!(
    edu_isr_0, edu_isr_1, edu_isr_2, edu_isr_3, edu_isr_4, edu_isr_5, edu_isr_6, edu_isr_7,
    edu_isr_8, edu_isr_9, edu_isr_10, edu_isr_11, edu_isr_12, edu_isr_13, edu_isr_14, edu_isr_15,
    edu_isr_16, edu_isr_17, edu_isr_18, edu_isr_19, edu_isr_20, edu_isr_21, edu_isr_22, edu_isr_23,
    edu_isr_24, edu_isr_25, edu_isr_26, edu_isr_27, edu_isr_28, edu_isr_29, edu_isr_30, edu_isr_31,
    edu_isr_32, edu_isr_33, edu_isr_34, edu_isr_35, edu_isr_36, edu_isr_37, edu_isr_38, edu_isr_39,
    edu_isr_40, edu_isr_41, edu_isr_42, edu_isr_43, edu_isr_44, edu_isr_45, edu_isr_46, edu_isr_47,
);

/// 어셈블리 트램펄린 주소 모음
///
/// 벡터 0-47은 디스패처로 가는 개별 트램펄린, 나머지는 바로 `iretd` 하는 기본 트램펄린입니다.
pub fn entry_points() -> EntryPoints {
    EntryPoints {
        default: edu_default_trampoline as usize as u32,
        routed: routed_addresses(),
    }
}
