//! EDU OS Kernel Entry Point
//!
//! 이 파일은 커널의 엔트리 포인트입니다.
//! 부트 섹터가 보호 모드로 전환하고 커널을 1 MiB에 올린 뒤 `kmain`을 호출합니다.
//!
//! 호스트 타깃에서는 안내 메시지만 출력합니다 (커널 이미지는 i686 베어메탈 전용).

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod image {
    use core::fmt::{self, Write};
    use core::panic::PanicInfo;

    use edu_os::arch::x86::{self, HardwareCpu, HardwarePorts};
    use edu_os::arch::Cpu;
    use edu_os::config::KernelConfig;
    use edu_os::drivers::serial::{SerialPort, COM1_BASE};
    use edu_os::interrupts::Registers;
    use edu_os::memory::BumpHeap;
    use edu_os::{log_error, log_info, logging, BootLayout, Kernel};
    use spin::Mutex;

    /// 전역 힙 할당자
    #[global_allocator]
    static HEAP: BumpHeap = BumpHeap::empty();

    static KERNEL: Kernel<HardwarePorts, HardwareCpu> = Kernel::new(
        // SAFETY: 커널 이미지는 링 0에서만 실행됩니다.
        unsafe { HardwarePorts::new() },
        unsafe { HardwareCpu::new() },
        &HEAP,
        KernelConfig::current(),
    );

    /// COM1 시리얼 포트 (로그 싱크)
    static COM1: Mutex<SerialPort<HardwarePorts>> =
        Mutex::new(SerialPort::new(unsafe { HardwarePorts::new() }, COM1_BASE));

    extern "C" {
        /// 링커 스크립트가 정의하는 커널 이미지 끝
        static kernel_end: u8;
    }

    fn serial_sink(args: fmt::Arguments) {
        // 인터럽트가 출력 도중의 메인 컨텍스트를 선점했다면 이번 줄은 버립니다.
        if let Some(mut port) = COM1.try_lock() {
            let _ = port.write_fmt(args);
        }
    }

    /// 예외/패닉 보고용 싱크
    ///
    /// `COM1` 잠금을 쥔 쪽은 다시 실행되지 않으므로 잠금 없이 같은 UART에 씁니다.
    fn fatal_sink(args: fmt::Arguments) {
        // SAFETY: 인터럽트가 꺼진 뒤에만 쓰이며, 이후 COM1을 쓰는 다른 코드는 없습니다.
        let mut port = SerialPort::new(unsafe { HardwarePorts::new() }, COM1_BASE);
        let _ = port.write_fmt(args);
    }

    fn uptime_ticks() -> u64 {
        KERNEL.ticks()
    }

    /// 트램펄린이 호출하는 공통 진입점
    #[no_mangle]
    extern "C" fn edu_interrupt_dispatch(regs: &Registers) {
        KERNEL.dispatch(regs);
    }

    /// 커널 엔트리 포인트
    #[no_mangle]
    pub extern "C" fn kmain() -> ! {
        COM1.lock().init();
        logging::set_sink(serial_sink);
        logging::set_fatal_sink(fatal_sink);
        logging::set_clock(uptime_ticks);

        log_info!("==============================");
        log_info!("  EDU OS kernel booting");
        log_info!("==============================");

        let config = KERNEL.config();
        log_info!(
            "Config: timer {} Hz, heap {} KiB",
            config.timer_frequency_hz,
            config.heap_size / 1024
        );

        let boot = BootLayout {
            kernel_end: unsafe { core::ptr::addr_of!(kernel_end) as usize },
            entry_points: x86::entry_points(),
        };

        if let Err(err) = KERNEL.start(&boot) {
            log_error!("Kernel initialization failed: {}", err);
            KERNEL.cpu().park();
        }

        let stats = KERNEL.stats();
        log_info!(
            "Heap: {:#x}..{:#x}",
            stats.heap_start,
            stats.heap_start + stats.heap_total
        );
        log_info!("Core services started (timer/keyboard/memory)");

        // 셸이 붙기 전까지는 입력을 시리얼로 되돌려 줍니다.
        loop {
            let ch = KERNEL.get_char();
            let _ = COM1.lock().write_char(ch);
        }
    }

    /// 패닉 핸들러
    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        KERNEL.cpu().disable_interrupts();
        logging::enter_fatal();
        log_error!("KERNEL PANIC: {}", info);
        logging::dump_recent();
        KERNEL.cpu().park()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("edu_os: the kernel image only runs on the bare-metal i686 target");
    eprintln!("build it with: cargo build --release --target i686-edu_os.json -Zbuild-std=core,alloc");
}
