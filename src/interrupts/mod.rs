//! 인터럽트 핸들러 모듈
//!
//! 이 모듈은 인터럽트 디스크립터 테이블(IDT), PIC 리매핑, 벡터 디스패치를 담당합니다.

pub mod dispatch;
pub mod idt;
pub mod pic;

pub use dispatch::{exception_name, FaultReport, HandlerRegistry, Registers, Route, EXCEPTION_VECTORS};
pub use idt::{EntryPoints, GateAttributes, IdtEntry, InterruptTable, TablePointer, KERNEL_CODE_SELECTOR};
pub use pic::{ChainedPics, PIC1_OFFSET, PIC2_OFFSET};
