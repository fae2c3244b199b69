//! 하드웨어 드라이버 모듈
//!
//! 이 모듈은 PIT 타이머, PS/2 키보드, 16550 시리얼 포트 드라이버를 포함합니다.

pub mod keyboard;
pub mod serial;
pub mod timer;
