//! 커널 초기화 오류

use core::fmt;

use crate::memory::HeapError;

/// 커널 코어 오류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `start`를 두 번 호출함
    AlreadyStarted,
    /// 채워지지 않은 IDT를 적재하려 함
    TableIncomplete,
    /// IDT가 이미 적재됨
    TableAlreadyActive,
    /// 힙 초기화/할당 실패
    Heap(HeapError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::AlreadyStarted => write!(f, "kernel already started"),
            KernelError::TableIncomplete => write!(f, "interrupt table is not fully populated"),
            KernelError::TableAlreadyActive => write!(f, "interrupt table already loaded"),
            KernelError::Heap(err) => write!(f, "heap error: {}", err),
        }
    }
}

impl From<HeapError> for KernelError {
    fn from(err: HeapError) -> Self {
        KernelError::Heap(err)
    }
}
