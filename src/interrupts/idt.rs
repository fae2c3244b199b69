//! IDT (Interrupt Descriptor Table) 구현
//!
//! 보호 모드 8바이트 게이트 256개로 된 테이블을 만들고 CPU에 적재합니다.
//!
//! 게이트 레이아웃 (리틀 엔디언):
//! `offset_low: u16 | selector: u16 | zero: u8 | attributes: u8 | offset_high: u16`
//!
//! 테이블 포인터 레이아웃: `limit: u16 | base: u32` (6바이트, 패딩 없음)

use core::mem::size_of;

use bitflags::bitflags;
use volatile::Volatile;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::arch::Cpu;
use crate::kernel::KernelError;

/// 테이블 엔트리 수
pub const IDT_ENTRIES: usize = 256;

/// 전용 트램펄린을 가지는 벡터 수 (예외 32개 + PIC 라인 16개)
pub const ROUTED_VECTORS: usize = 48;

/// 커널 코드 세그먼트 셀렉터 (GDT 인덱스 1, 링 0 = 0x08)
pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);

bitflags! {
    /// 게이트 타입/속성 바이트
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GateAttributes: u8 {
        const PRESENT = 1 << 7;
        const INTERRUPT_GATE_32 = 0x0E;
    }
}

impl GateAttributes {
    /// 커널 32비트 인터럽트 게이트 (0x8E)
    pub const KERNEL_INTERRUPT: Self =
        Self::from_bits_retain(Self::PRESENT.bits() | Self::INTERRUPT_GATE_32.bits());

    /// 주어진 DPL의 32비트 인터럽트 게이트
    pub const fn interrupt_gate(dpl: PrivilegeLevel) -> Self {
        Self::from_bits_retain(
            Self::PRESENT.bits() | Self::INTERRUPT_GATE_32.bits() | ((dpl as u8) << 5),
        )
    }

    pub fn privilege_level(self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(u16::from((self.bits() >> 5) & 0b11))
    }
}

/// IDT 게이트 하나
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    attributes: u8,
    offset_high: u16,
}

impl IdtEntry {
    /// 비어 있는 (not present) 게이트
    pub const MISSING: Self = Self {
        offset_low: 0,
        selector: 0,
        zero: 0,
        attributes: 0,
        offset_high: 0,
    };

    pub const fn new(handler: u32, selector: SegmentSelector, attributes: GateAttributes) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: selector.0,
            zero: 0,
            attributes: attributes.bits(),
            offset_high: (handler >> 16) as u16,
        }
    }

    pub fn handler_address(&self) -> u32 {
        (u32::from(self.offset_high) << 16) | u32::from(self.offset_low)
    }

    pub fn selector(&self) -> SegmentSelector {
        SegmentSelector(self.selector)
    }

    pub fn attributes(&self) -> GateAttributes {
        GateAttributes::from_bits_retain(self.attributes)
    }

    pub fn is_present(&self) -> bool {
        self.attributes().contains(GateAttributes::PRESENT)
    }

    /// CPU가 읽는 그대로의 8바이트
    pub fn to_bytes(&self) -> [u8; 8] {
        let low = self.offset_low.to_le_bytes();
        let selector = self.selector.to_le_bytes();
        let high = self.offset_high.to_le_bytes();
        [low[0], low[1], selector[0], selector[1], self.zero, self.attributes, high[0], high[1]]
    }
}

/// `lidt` 피연산자
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePointer {
    limit: u16,
    base: u32,
}

impl TablePointer {
    pub const fn new(limit: u16, base: u32) -> Self {
        Self { limit, base }
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    pub fn base(&self) -> u32 {
        self.base
    }
}

/// 트램펄린 주소 모음
///
/// `routed[v]`는 벡터 `v` (0-47) 전용 트램펄린, `default`는 나머지 벡터가 쓰는 트램펄린입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    pub default: u32,
    pub routed: [u32; ROUTED_VECTORS],
}

/// 인터럽트 디스크립터 테이블
#[repr(C, align(8))]
pub struct InterruptTable {
    entries: [IdtEntry; IDT_ENTRIES],
    active: bool,
}

impl InterruptTable {
    pub const fn new() -> Self {
        Self {
            entries: [IdtEntry::MISSING; IDT_ENTRIES],
            active: false,
        }
    }

    /// 게이트 하나 설치
    ///
    /// 같은 벡터에 다시 설치하면 덮어씁니다.
    pub fn install(
        &mut self,
        vector: u8,
        handler: u32,
        selector: SegmentSelector,
        attributes: GateAttributes,
    ) {
        // 활성 테이블은 CPU가 언제든 읽으므로 volatile로 씁니다.
        Volatile::new(&mut self.entries[usize::from(vector)])
            .write(IdtEntry::new(handler, selector, attributes));
    }

    /// 256개 벡터 전부 채우기
    pub fn populate(
        &mut self,
        entry_points: &EntryPoints,
        selector: SegmentSelector,
        attributes: GateAttributes,
    ) {
        for vector in 0..=u8::MAX {
            let handler = entry_points
                .routed
                .get(usize::from(vector))
                .copied()
                .unwrap_or(entry_points.default);
            self.install(vector, handler, selector, attributes);
        }
    }

    pub fn entry(&self, vector: u8) -> IdtEntry {
        self.entries[usize::from(vector)]
    }

    pub fn is_populated(&self) -> bool {
        self.entries.iter().all(IdtEntry::is_present)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 이 테이블을 가리키는 `lidt` 피연산자
    pub fn pointer(&self) -> TablePointer {
        TablePointer::new(
            (size_of::<[IdtEntry; IDT_ENTRIES]>() - 1) as u16,
            self.entries.as_ptr() as usize as u32,
        )
    }

    /// CPU에 테이블 적재
    ///
    /// # Safety
    ///
    /// 테이블은 이후 커널이 살아 있는 동안 같은 주소에 남아 있어야 합니다.
    pub unsafe fn activate(&mut self, cpu: &impl Cpu) -> Result<(), KernelError> {
        if self.active {
            return Err(KernelError::TableAlreadyActive);
        }
        if !self.is_populated() {
            return Err(KernelError::TableIncomplete);
        }

        let pointer = self.pointer();
        cpu.load_interrupt_table(&pointer);
        self.active = true;

        crate::log_info!(
            "IDT loaded: base={:#010x}, limit={}",
            pointer.base(),
            pointer.limit()
        );
        Ok(())
    }
}

impl Default for InterruptTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::FakeCpu;

    fn entry_points() -> EntryPoints {
        let mut routed = [0u32; ROUTED_VECTORS];
        for (vector, address) in routed.iter_mut().enumerate() {
            *address = 0x0010_0000 + (vector as u32) * 0x10;
        }
        EntryPoints {
            default: 0x0010_0800,
            routed,
        }
    }

    #[test]
    fn layouts_have_hardware_sizes() {
        assert_eq!(size_of::<IdtEntry>(), 8);
        assert_eq!(size_of::<TablePointer>(), 6);
        assert_eq!(size_of::<[IdtEntry; IDT_ENTRIES]>(), 2048);
    }

    #[test]
    fn kernel_gate_bytes() {
        assert_eq!(GateAttributes::KERNEL_INTERRUPT.bits(), 0x8E);
        assert_eq!(KERNEL_CODE_SELECTOR.0, 0x08);

        let entry = IdtEntry::new(0x1234_5678, KERNEL_CODE_SELECTOR, GateAttributes::KERNEL_INTERRUPT);
        assert_eq!(entry.to_bytes(), [0x78, 0x56, 0x08, 0x00, 0x00, 0x8E, 0x34, 0x12]);
        assert_eq!(entry.handler_address(), 0x1234_5678);
        assert!(entry.is_present());
        assert!(!IdtEntry::MISSING.is_present());
    }

    #[test]
    fn gate_privilege_level() {
        let user = GateAttributes::interrupt_gate(PrivilegeLevel::Ring3);
        assert_eq!(user.bits(), 0xEE);
        assert_eq!(user.privilege_level(), PrivilegeLevel::Ring3);
        assert_eq!(GateAttributes::KERNEL_INTERRUPT.privilege_level(), PrivilegeLevel::Ring0);
    }

    #[test]
    fn install_overwrites_single_vector() {
        let mut table = InterruptTable::new();
        table.install(3, 0xAAAA, KERNEL_CODE_SELECTOR, GateAttributes::KERNEL_INTERRUPT);
        table.install(3, 0xBBBB_0000, KERNEL_CODE_SELECTOR, GateAttributes::KERNEL_INTERRUPT);

        assert_eq!(table.entry(3).handler_address(), 0xBBBB_0000);
        assert!(!table.entry(4).is_present());
        assert!(!table.is_populated());
    }

    #[test]
    fn populate_routes_low_vectors_and_defaults_the_rest() {
        let points = entry_points();
        let mut table = InterruptTable::new();
        table.populate(&points, KERNEL_CODE_SELECTOR, GateAttributes::KERNEL_INTERRUPT);

        assert!(table.is_populated());
        assert_eq!(table.entry(0).handler_address(), points.routed[0]);
        assert_eq!(table.entry(47).handler_address(), points.routed[47]);
        assert_eq!(table.entry(48).handler_address(), points.default);
        assert_eq!(table.entry(255).handler_address(), points.default);
        assert_eq!(table.entry(200).selector(), KERNEL_CODE_SELECTOR);
        assert_eq!(table.entry(200).attributes(), GateAttributes::KERNEL_INTERRUPT);
    }

    #[test]
    fn activate_requires_full_table() {
        let cpu = FakeCpu::new();
        let mut table = InterruptTable::new();

        let result = unsafe { table.activate(&cpu) };
        assert_eq!(result, Err(KernelError::TableIncomplete));
        assert!(cpu.loaded_table().is_none());
    }

    #[test]
    fn activate_loads_pointer_once() {
        let cpu = FakeCpu::new();
        let mut table = InterruptTable::new();
        table.populate(&entry_points(), KERNEL_CODE_SELECTOR, GateAttributes::KERNEL_INTERRUPT);

        assert_eq!(unsafe { table.activate(&cpu) }, Ok(()));
        assert!(table.is_active());

        let loaded = cpu.loaded_table().expect("table loaded");
        assert_eq!(loaded.limit(), 2047);
        assert_eq!(loaded, table.pointer());

        assert_eq!(unsafe { table.activate(&cpu) }, Err(KernelError::TableAlreadyActive));
    }
}
