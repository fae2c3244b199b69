//! 메모리 관리 모듈
//!
//! 커널 힙(범프 할당자)을 제공합니다.

pub mod heap;

pub use heap::{BumpHeap, HeapError, DEFAULT_ALIGNMENT};
