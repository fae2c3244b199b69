//! 힙 할당자 설정
//!
//! 커널 이미지 끝 바로 뒤(페이지 정렬)부터 고정 크기 구간을 잘라 쓰는 범프 할당자입니다.
//! 해제는 하지 않습니다. 할당은 원자적 CAS로 커서를 옮기므로 잠금이 필요 없습니다.

use core::alloc::{GlobalAlloc, Layout};
use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

/// 힙 시작 정렬 (페이지)
pub const HEAP_START_ALIGNMENT: usize = 0x1000;

/// `allocate`와 정렬 0 요청의 기본 정렬
pub const DEFAULT_ALIGNMENT: usize = 16;

/// 힙 오류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// 남은 공간 부족
    Exhausted { requested: usize, available: usize },
    /// 2의 거듭제곱이 아닌 정렬
    InvalidAlignment(usize),
    /// 두 번째 초기화 시도
    AlreadyInitialized,
    /// 초기화 전 할당
    Uninitialized,
    /// 주소 공간을 넘는 구간
    InvalidRegion,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::Exhausted { requested, available } => write!(
                f,
                "heap exhausted: requested {} bytes, {} available",
                requested, available
            ),
            HeapError::InvalidAlignment(align) => write!(f, "invalid alignment: {}", align),
            HeapError::AlreadyInitialized => write!(f, "heap already initialized"),
            HeapError::Uninitialized => write!(f, "heap not initialized"),
            HeapError::InvalidRegion => write!(f, "heap region exceeds address space"),
        }
    }
}

fn align_up(value: usize, alignment: usize) -> Option<usize> {
    value
        .checked_add(alignment - 1)
        .map(|bumped| bumped & !(alignment - 1))
}

/// 범프 힙
///
/// `end == 0`이면 아직 초기화되지 않은 상태입니다.
pub struct BumpHeap {
    start: AtomicUsize,
    end: AtomicUsize,
    next: AtomicUsize,
}

impl BumpHeap {
    pub const fn empty() -> Self {
        Self {
            start: AtomicUsize::new(0),
            end: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
        }
    }

    /// 힙 구간 설정
    ///
    /// 시작 주소는 `kernel_end`를 페이지 경계로 올린 값입니다. 시작 주소를 돌려줍니다.
    pub fn init(&self, kernel_end: usize, capacity: usize) -> Result<usize, HeapError> {
        if self.is_initialized() {
            return Err(HeapError::AlreadyInitialized);
        }

        let start = align_up(kernel_end, HEAP_START_ALIGNMENT).ok_or(HeapError::InvalidRegion)?;
        let end = start.checked_add(capacity).ok_or(HeapError::InvalidRegion)?;
        if end == 0 {
            return Err(HeapError::InvalidRegion);
        }

        self.start.store(start, Ordering::Relaxed);
        self.next.store(start, Ordering::Relaxed);
        self.end.store(end, Ordering::Release);

        crate::log_info!(
            "Heap initialized: {:#x} - {:#x} ({} KB)",
            start,
            end,
            capacity / 1024
        );
        Ok(start)
    }

    pub fn is_initialized(&self) -> bool {
        self.end.load(Ordering::Acquire) != 0
    }

    /// 16바이트 정렬 할당
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.allocate_aligned(size, DEFAULT_ALIGNMENT)
    }

    /// 정렬 할당
    ///
    /// 실패하면 커서는 움직이지 않습니다. 정렬 0은 기본 정렬로 취급합니다.
    pub fn allocate_aligned(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, HeapError> {
        let alignment = if alignment == 0 { DEFAULT_ALIGNMENT } else { alignment };
        if !alignment.is_power_of_two() {
            return Err(HeapError::InvalidAlignment(alignment));
        }

        let end = self.end.load(Ordering::Acquire);
        if end == 0 {
            return Err(HeapError::Uninitialized);
        }

        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let exhausted = HeapError::Exhausted {
                requested: size,
                available: end.saturating_sub(current),
            };
            let aligned = align_up(current, alignment).ok_or(exhausted)?;
            let new_next = match aligned.checked_add(size) {
                Some(new_next) if new_next <= end => new_next,
                _ => return Err(exhausted),
            };

            match self.next.compare_exchange_weak(
                current,
                new_next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return NonNull::new(aligned as *mut u8).ok_or(HeapError::Uninitialized);
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn total_capacity(&self) -> usize {
        self.end
            .load(Ordering::Acquire)
            .saturating_sub(self.start.load(Ordering::Relaxed))
    }

    pub fn used_bytes(&self) -> usize {
        if !self.is_initialized() {
            return 0;
        }
        self.next
            .load(Ordering::Acquire)
            .saturating_sub(self.start.load(Ordering::Relaxed))
    }

    pub fn free_bytes(&self) -> usize {
        self.end
            .load(Ordering::Acquire)
            .saturating_sub(self.next.load(Ordering::Acquire))
    }

    pub fn start_address(&self) -> usize {
        self.start.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for BumpHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate_aligned(layout.size(), layout.align())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        // 범프 할당자는 해제하지 않음
    }
}
