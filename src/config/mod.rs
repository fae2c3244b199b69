//! 커널 설정
//!
//! 컴파일 타임 설정입니다. 런타임 설정 파일은 없습니다.
//! 로그 레벨은 빌드 프로필(cargo feature `verbose`/`quiet`)로 고릅니다.

pub mod profile;

pub use profile::{current_profile, Profile};

use crate::drivers::timer::DEFAULT_FREQUENCY_HZ;
use crate::logging::LogLevel;

/// 기본 힙 크기 (1 MiB)
pub const DEFAULT_HEAP_SIZE: usize = 1024 * 1024;

/// 커널 코어 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// 부팅 시 요청할 타이머 주파수
    pub timer_frequency_hz: u32,
    /// 커널 이미지 뒤에 잡을 힙 크기
    pub heap_size: usize,
    pub log_level: LogLevel,
}

impl KernelConfig {
    pub const fn current() -> Self {
        let log_level = match current_profile() {
            Profile::Verbose => LogLevel::Trace,
            Profile::Quiet => LogLevel::Warn,
            Profile::Standard => LogLevel::Info,
        };
        Self {
            timer_frequency_hz: DEFAULT_FREQUENCY_HZ,
            heap_size: DEFAULT_HEAP_SIZE,
            log_level,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = KernelConfig::current();
        assert_eq!(config.timer_frequency_hz, 100);
        assert_eq!(config.heap_size, 1024 * 1024);
        assert_eq!(config.log_level, crate::logging::LOG_LEVEL);
    }
}
