//! PIC (Programmable Interrupt Controller) 리매핑
//!
//! 이 모듈은 PIC를 리매핑하여 하드웨어 인터럽트가 시스템 예외와 충돌하지 않도록 합니다.

use crate::arch::PortIo;

/// PIC 제어 포트
pub const PIC1_COMMAND: u16 = 0x20;
pub const PIC1_DATA: u16 = 0x21;
pub const PIC2_COMMAND: u16 = 0xA0;
pub const PIC2_DATA: u16 = 0xA1;

/// ICW1 (Initialization Command Word 1) 플래그
const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;

/// ICW4 플래그
const ICW4_8086: u8 = 0x01;

/// End Of Interrupt 명령
pub const PIC_EOI: u8 = 0x20;

/// 슬레이브 PIC가 연결된 마스터 라인
const CASCADE_LINE: u8 = 2;

/// PIC 리매핑된 인터럽트 벡터 오프셋
pub const PIC1_OFFSET: u8 = 32; // 0x20 (시스템 예외 0-31 이후)
pub const PIC2_OFFSET: u8 = 40; // 0x28

/// 라인 수 (마스터 8 + 슬레이브 8)
pub const IRQ_LINES: u8 = 16;

/// 마스터/슬레이브 8259 쌍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainedPics {
    master_offset: u8,
    slave_offset: u8,
}

impl ChainedPics {
    pub const fn new(master_offset: u8, slave_offset: u8) -> Self {
        Self {
            master_offset,
            slave_offset,
        }
    }

    /// IRQ 0-7 → 32-39, IRQ 8-15 → 40-47
    pub const fn legacy_remap() -> Self {
        Self::new(PIC1_OFFSET, PIC2_OFFSET)
    }

    /// PIC 초기화 및 리매핑
    ///
    /// 초기화 후 모든 라인은 마스크된 상태입니다. 드라이버가 필요한 라인만 켭니다.
    pub fn initialize(&self, ports: &impl PortIo) {
        // ICW1: 초기화 시작
        ports.write_byte(PIC1_COMMAND, ICW1_INIT | ICW1_ICW4);
        ports.io_wait();
        ports.write_byte(PIC2_COMMAND, ICW1_INIT | ICW1_ICW4);
        ports.io_wait();

        // ICW2: 벡터 오프셋 설정
        ports.write_byte(PIC1_DATA, self.master_offset);
        ports.io_wait();
        ports.write_byte(PIC2_DATA, self.slave_offset);
        ports.io_wait();

        // ICW3: 마스터/슬레이브 연결
        ports.write_byte(PIC1_DATA, 1 << CASCADE_LINE);
        ports.io_wait();
        ports.write_byte(PIC2_DATA, CASCADE_LINE);
        ports.io_wait();

        // ICW4: 8086 모드
        ports.write_byte(PIC1_DATA, ICW4_8086);
        ports.io_wait();
        ports.write_byte(PIC2_DATA, ICW4_8086);
        ports.io_wait();

        // 모든 인터럽트 마스크 (나중에 개별적으로 활성화)
        ports.write_byte(PIC1_DATA, 0xFF);
        ports.write_byte(PIC2_DATA, 0xFF);

        crate::log_info!(
            "PIC remapped: master={}, slave={}",
            self.master_offset,
            self.slave_offset
        );
    }

    /// 벡터가 PIC 라인이면 라인 번호
    pub fn line_for_vector(&self, vector: u8) -> Option<u8> {
        if (self.master_offset..self.master_offset.saturating_add(8)).contains(&vector) {
            Some(vector - self.master_offset)
        } else if (self.slave_offset..self.slave_offset.saturating_add(8)).contains(&vector) {
            Some(vector - self.slave_offset + 8)
        } else {
            None
        }
    }

    pub fn vector_for_line(&self, line: u8) -> Option<u8> {
        match line {
            0..=7 => Some(self.master_offset + line),
            8..=15 => Some(self.slave_offset + line - 8),
            _ => None,
        }
    }

    /// PIC 인터럽트 종료 신호 전송
    ///
    /// 슬레이브 라인은 슬레이브에 먼저, 그다음 마스터에 보냅니다.
    pub fn acknowledge(&self, ports: &impl PortIo, line: u8) {
        if line >= IRQ_LINES {
            return;
        }
        if line >= 8 {
            ports.write_byte(PIC2_COMMAND, PIC_EOI);
        }
        ports.write_byte(PIC1_COMMAND, PIC_EOI);
    }

    /// 라인 마스크 설정
    ///
    /// 슬레이브 라인을 켜면 캐스케이드 라인도 함께 켭니다.
    /// 호출자는 인터럽트를 끈 상태에서 불러야 합니다 (읽기-수정-쓰기).
    pub fn set_mask(&self, ports: &impl PortIo, line: u8, enabled: bool) {
        if line >= IRQ_LINES {
            return;
        }

        let port = if line < 8 { PIC1_DATA } else { PIC2_DATA };
        let mut current_mask = ports.read_byte(port);
        let bit = 1 << (line % 8);

        if enabled {
            current_mask &= !bit; // 비트 클리어 = 인터럽트 활성화
        } else {
            current_mask |= bit; // 비트 설정 = 인터럽트 비활성화
        }
        ports.write_byte(port, current_mask);

        if enabled && line >= 8 {
            self.set_mask(ports, CASCADE_LINE, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::FakePorts;

    #[test]
    fn initialize_sequence() {
        let ports = FakePorts::new();
        ChainedPics::legacy_remap().initialize(&ports);

        assert_eq!(
            ports.writes(),
            vec![
                (PIC1_COMMAND, 0x11),
                (PIC2_COMMAND, 0x11),
                (PIC1_DATA, 32),
                (PIC2_DATA, 40),
                (PIC1_DATA, 4),
                (PIC2_DATA, 2),
                (PIC1_DATA, 0x01),
                (PIC2_DATA, 0x01),
                (PIC1_DATA, 0xFF),
                (PIC2_DATA, 0xFF),
            ]
        );
    }

    #[test]
    fn master_line_acknowledges_master_only() {
        let ports = FakePorts::new();
        ChainedPics::legacy_remap().acknowledge(&ports, 1);
        assert_eq!(ports.writes(), vec![(PIC1_COMMAND, PIC_EOI)]);
    }

    #[test]
    fn slave_line_acknowledges_slave_then_master() {
        let ports = FakePorts::new();
        ChainedPics::legacy_remap().acknowledge(&ports, 12);
        assert_eq!(ports.writes(), vec![(PIC2_COMMAND, PIC_EOI), (PIC1_COMMAND, PIC_EOI)]);
    }

    #[test]
    fn out_of_range_line_is_ignored() {
        let ports = FakePorts::new();
        ChainedPics::legacy_remap().acknowledge(&ports, 16);
        assert!(ports.writes().is_empty());
    }

    #[test]
    fn vector_line_mapping() {
        let pics = ChainedPics::legacy_remap();
        assert_eq!(pics.line_for_vector(31), None);
        assert_eq!(pics.line_for_vector(32), Some(0));
        assert_eq!(pics.line_for_vector(39), Some(7));
        assert_eq!(pics.line_for_vector(40), Some(8));
        assert_eq!(pics.line_for_vector(47), Some(15));
        assert_eq!(pics.line_for_vector(48), None);
        assert_eq!(pics.vector_for_line(1), Some(33));
        assert_eq!(pics.vector_for_line(14), Some(46));
        assert_eq!(pics.vector_for_line(16), None);
    }

    #[test]
    fn unmasking_slave_line_opens_cascade() {
        let ports = FakePorts::new();
        let pics = ChainedPics::legacy_remap();
        pics.initialize(&ports);
        ports.clear_writes();

        pics.set_mask(&ports, 12, true);
        assert_eq!(ports.writes(), vec![(PIC2_DATA, 0xEF), (PIC1_DATA, 0xFB)]);

        ports.clear_writes();
        pics.set_mask(&ports, 0, true);
        pics.set_mask(&ports, 12, false);
        assert_eq!(ports.writes(), vec![(PIC1_DATA, 0xFA), (PIC2_DATA, 0xFF)]);
    }
}
