//! 로깅 시스템
//!
//! 이 모듈은 커널 전역 로깅 시스템을 제공합니다.
//! 출력은 등록된 싱크(커널 이미지에서는 COM1 시리얼)로 보내고,
//! 최근 로그는 링 버퍼에 남겨 예외 진단 때 덤프합니다.
//!
//! 인터럽트 컨텍스트에서도 호출되므로 평소에는 잠금을 `try_lock`으로만 잡습니다.
//! 치명적 경로(`enter_fatal` 이후)는 잠금에 막히지 않는 비상 싱크로 출력하고,
//! 최근 로그 덤프는 주인이 다시 실행될 수 없는 링 잠금을 강제로 엽니다.

use core::fmt;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::{Mutex, MutexGuard, Once};

use crate::config::KernelConfig;

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// 에러 레벨 (항상 출력)
    Error = 0,
    /// 경고 레벨
    Warn = 1,
    /// 정보 레벨
    Info = 2,
    /// 디버그 레벨
    Debug = 3,
    /// 트레이스 레벨 (가장 상세)
    Trace = 4,
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN ",
            LogLevel::Info => "INFO ",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// 현재 로그 레벨 (빌드 프로필로 결정)
pub const LOG_LEVEL: LogLevel = KernelConfig::current().log_level;

const RING_CAPACITY: usize = 64;
const MAX_LOG_LINE_LEN: usize = 96;

/// 덤프 전에 링 잠금을 다시 시도하는 횟수
const FATAL_LOCK_ATTEMPTS: usize = 1 << 16;

/// 로그 출력 대상
pub type LogSink = fn(fmt::Arguments);

/// 타임스탬프 소스 (틱)
pub type LogClock = fn() -> u64;

static SINK: Once<LogSink> = Once::new();
static FATAL_SINK: Once<LogSink> = Once::new();
static CLOCK: Once<LogClock> = Once::new();
static FATAL: AtomicBool = AtomicBool::new(false);

/// 로그 싱크 등록 (한 번만 적용)
pub fn set_sink(sink: LogSink) {
    SINK.call_once(|| sink);
}

/// 비상 싱크 등록 (한 번만 적용)
///
/// 잠금 없이 출력해야 합니다. 없으면 치명적 경로도 일반 싱크를 씁니다.
pub fn set_fatal_sink(sink: LogSink) {
    FATAL_SINK.call_once(|| sink);
}

/// 치명적 경로 진입. 되돌릴 수 없습니다.
///
/// 인터럽트를 끈 뒤에 호출합니다.
pub fn enter_fatal() {
    FATAL.store(true, Ordering::Release);
}

fn is_fatal() -> bool {
    FATAL.load(Ordering::Acquire)
}

fn active_sink() -> Option<&'static LogSink> {
    if is_fatal() {
        FATAL_SINK.get().or_else(|| SINK.get())
    } else {
        SINK.get()
    }
}

/// 타임스탬프 소스 등록 (한 번만 적용)
pub fn set_clock(clock: LogClock) {
    CLOCK.call_once(|| clock);
}

/// 구조화된 로그 엔트리
#[derive(Clone, Copy)]
struct LogEntry {
    timestamp: u64,
    level: LogLevel,
    message: [u8; MAX_LOG_LINE_LEN],
    message_len: usize,
}

impl LogEntry {
    const fn new() -> Self {
        Self {
            timestamp: 0,
            level: LogLevel::Info,
            message: [0; MAX_LOG_LINE_LEN],
            message_len: 0,
        }
    }

    fn set(&mut self, timestamp: u64, level: LogLevel, msg: &str) {
        self.timestamp = timestamp;
        self.level = level;
        self.message_len = msg.len().min(MAX_LOG_LINE_LEN);
        self.message[..self.message_len].copy_from_slice(&msg.as_bytes()[..self.message_len]);
    }

    fn message(&self) -> &str {
        core::str::from_utf8(&self.message[..self.message_len]).unwrap_or("")
    }
}

struct LogRing {
    entries: [LogEntry; RING_CAPACITY],
    head: usize,
    count: usize,
}

impl LogRing {
    const fn new() -> Self {
        Self {
            entries: [LogEntry::new(); RING_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    fn push(&mut self, timestamp: u64, level: LogLevel, msg: &str) {
        self.entries[self.head].set(timestamp, level, msg);
        self.head = (self.head + 1) % RING_CAPACITY;
        if self.count < RING_CAPACITY {
            self.count += 1;
        }
    }

    fn for_each<F: FnMut(&LogEntry)>(&self, mut f: F) {
        let start = if self.count == RING_CAPACITY { self.head } else { 0 };
        for i in 0..self.count {
            f(&self.entries[(start + i) % RING_CAPACITY]);
        }
    }
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing::new());

/// 로그 출력 함수
pub fn log(level: LogLevel, args: fmt::Arguments) {
    if level > LOG_LEVEL {
        return;
    }

    let timestamp = CLOCK.get().map_or(0, |clock| clock());

    if let Some(sink) = active_sink() {
        sink(format_args!("{} {}\n", level.prefix(), args));
    }

    // 메시지를 문자열로 포맷팅 (임시 버퍼 사용)
    let mut buf = [0u8; MAX_LOG_LINE_LEN];
    let mut line = LineBuffer { buf: &mut buf, pos: 0 };
    let _ = fmt::Write::write_fmt(&mut line, args);
    let len = line.pos;

    if let Some(mut ring) = LOG_RING.try_lock() {
        ring.push(timestamp, level, core::str::from_utf8(&buf[..len]).unwrap_or(""));
    }
}

/// 임시 로그 버퍼 (포맷팅용)
///
/// 넘치는 부분은 문자 경계에서 잘라 버립니다.
struct LineBuffer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl fmt::Write for LineBuffer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = self.buf.len() - self.pos;
        let mut take = s.len().min(remaining);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.pos..self.pos + take].copy_from_slice(&s.as_bytes()[..take]);
        self.pos += take;
        Ok(())
    }
}

/// 치명적 경로용 링 잠금
///
/// 잠시 기다려도 풀리지 않으면 강제로 엽니다. 인터럽트가 꺼진 단일 코어에서는
/// 잠금을 쥔 쪽이 다시 실행되지 않습니다.
fn lock_ring_for_dump() -> Option<MutexGuard<'static, LogRing>> {
    for _ in 0..FATAL_LOCK_ATTEMPTS {
        if let Some(ring) = LOG_RING.try_lock() {
            return Some(ring);
        }
        spin_loop();
    }
    // SAFETY: 주인이 선점된 채 멈춰 있으므로 링을 더 수정하지 않습니다.
    unsafe { LOG_RING.force_unlock() };
    LOG_RING.try_lock()
}

/// 최근 로그 덤프 (예외/패닉 경로 전용)
pub fn dump_recent() {
    let Some(sink) = active_sink() else {
        return;
    };
    sink(format_args!("\n--- Recent Logs ---\n"));
    if let Some(ring) = lock_ring_for_dump() {
        ring.for_each(|entry| {
            sink(format_args!(
                "[{:>8}] [{}] {}\n",
                entry.timestamp,
                entry.level.label(),
                entry.message()
            ));
        });
    }
    sink(format_args!("--- End Logs ---\n"));
}

/// 테스트에서 다른 컨텍스트가 링을 쥐고 있는 상황을 만듭니다.
#[cfg(test)]
pub(crate) fn hold_ring() -> impl Sized {
    LOG_RING.lock()
}

/// 에러 레벨 로그 매크로
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Error, format_args!($($arg)*));
    };
}

/// 경고 레벨 로그 매크로
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Warn, format_args!($($arg)*));
    };
}

/// 정보 레벨 로그 매크로
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Info, format_args!($($arg)*));
    };
}

/// 디버그 레벨 로그 매크로
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Debug, format_args!($($arg)*));
    };
}

/// 트레이스 레벨 로그 매크로
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Trace, format_args!($($arg)*));
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn line_buffer_truncates_on_char_boundary() {
        let mut buf = [0u8; 5];
        let mut line = LineBuffer { buf: &mut buf, pos: 0 };
        write!(line, "ab{}", "가나").unwrap();

        // "가"는 3바이트: 2 + 3 = 5, "나"는 들어가지 않음
        assert_eq!(line.pos, 5);
        assert_eq!(core::str::from_utf8(&buf).unwrap(), "ab가");
    }

    #[test]
    fn ring_keeps_most_recent_in_order() {
        let mut ring = LogRing::new();
        for i in 0..RING_CAPACITY + 3 {
            ring.push(i as u64, LogLevel::Info, "entry");
        }

        let mut timestamps = Vec::new();
        ring.for_each(|entry| timestamps.push(entry.timestamp));
        assert_eq!(timestamps.len(), RING_CAPACITY);
        assert_eq!(timestamps[0], 3);
        assert_eq!(*timestamps.last().unwrap(), (RING_CAPACITY + 2) as u64);
    }

    #[test]
    fn long_messages_are_clamped() {
        let mut entry = LogEntry::new();
        let long = "x".repeat(MAX_LOG_LINE_LEN * 2);
        entry.set(7, LogLevel::Warn, &long);
        assert_eq!(entry.message().len(), MAX_LOG_LINE_LEN);
        assert_eq!(entry.level, LogLevel::Warn);
    }

    #[test]
    fn levels_are_ordered_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(LogLevel::Warn.prefix(), "[WARN] ");
    }
}
