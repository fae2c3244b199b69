//! EDU OS Kernel Core Library
//!
//! 이 모듈은 EDU OS 커널 코어의 라이브러리 루트입니다.
//! 인터럽트 테이블, PIC 브리지, 디스패처, 타이머, 키보드, 힙 할당자를 제공하며
//! 하드웨어 접근은 모두 `arch`의 캐퍼빌리티 트레이트를 거칩니다.
//! 덕분에 디스패치/드라이버 로직을 호스트 테스트에서 가짜 백엔드로 돌릴 수 있습니다.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod drivers;
pub mod interrupts;
pub mod kernel;
pub mod logging;
pub mod memory;

// 매크로는 자동으로 crate 루트에 사용 가능하므로 재export 불필요
// 사용: edu_os::log_info!()

pub use kernel::{BootLayout, Kernel, KernelError, KernelStats};
