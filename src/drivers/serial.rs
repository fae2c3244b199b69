//! 시리얼 포트 드라이버
//!
//! 이 모듈은 UART 16550 시리얼 포트를 사용하여 로그 출력을 제공합니다.
//! 커널 이미지는 COM1을 로그 싱크로 등록합니다.

use core::fmt;

use crate::arch::PortIo;

/// COM1 시리얼 포트 기본 주소
pub const COM1_BASE: u16 = 0x3F8;

/// UART 레지스터 오프셋
const DATA: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CONTROL: u16 = 2;
const LINE_CONTROL: u16 = 3;
const MODEM_CONTROL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// LCR.DLAB (분주기 래치 접근)
const LINE_CONTROL_DLAB: u8 = 0x80;
/// 8N1
const LINE_CONTROL_8N1: u8 = 0x03;
/// LSR: 송신 버퍼 비어 있음
const LINE_STATUS_THR_EMPTY: u8 = 0x20;

/// 38400 baud (115200 / 3)
const BAUD_DIVISOR: u16 = 3;

/// 16550 UART
pub struct SerialPort<P: PortIo> {
    ports: P,
    base: u16,
}

impl<P: PortIo> SerialPort<P> {
    pub const fn new(ports: P, base: u16) -> Self {
        Self { ports, base }
    }

    /// 시리얼 포트 초기화
    ///
    /// 커널 초기화 시 한 번 호출되어야 합니다.
    pub fn init(&mut self) {
        self.write_register(INTERRUPT_ENABLE, 0x00);
        self.write_register(LINE_CONTROL, LINE_CONTROL_DLAB);
        self.write_register(DATA, (BAUD_DIVISOR & 0xFF) as u8);
        self.write_register(INTERRUPT_ENABLE, (BAUD_DIVISOR >> 8) as u8);
        self.write_register(LINE_CONTROL, LINE_CONTROL_8N1);
        // FIFO 활성화, 비우기, 14바이트 임계값
        self.write_register(FIFO_CONTROL, 0xC7);
        // DTR, RTS, OUT2
        self.write_register(MODEM_CONTROL, 0x0B);
    }

    fn write_register(&self, offset: u16, value: u8) {
        self.ports.write_byte(self.base + offset, value);
    }

    fn transmit_empty(&self) -> bool {
        self.ports.read_byte(self.base + LINE_STATUS) & LINE_STATUS_THR_EMPTY != 0
    }

    /// 단일 바이트 출력
    pub fn send(&mut self, byte: u8) {
        while !self.transmit_empty() {
            core::hint::spin_loop();
        }
        self.write_register(DATA, byte);
    }
}

impl<P: PortIo> fmt::Write for SerialPort<P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.send(b'\r');
            }
            self.send(byte);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::FakePorts;
    use core::fmt::Write;

    #[test]
    fn init_programs_8n1_with_fifo() {
        let ports = FakePorts::new();
        SerialPort::new(&ports, COM1_BASE).init();

        assert_eq!(
            ports.writes(),
            vec![
                (0x3F9, 0x00),
                (0x3FB, 0x80),
                (0x3F8, 0x03),
                (0x3F9, 0x00),
                (0x3FB, 0x03),
                (0x3FA, 0xC7),
                (0x3FC, 0x0B),
            ]
        );
    }

    #[test]
    fn newline_becomes_crlf() {
        let ports = FakePorts::new();
        // LSR가 항상 "송신 가능"을 보고하도록 래치
        ports.write_byte(COM1_BASE + LINE_STATUS, LINE_STATUS_THR_EMPTY);
        ports.clear_writes();

        let mut serial = SerialPort::new(&ports, COM1_BASE);
        writeln!(serial, "ok").unwrap();

        assert_eq!(ports.writes_to(COM1_BASE), b"ok\r\n".to_vec());
    }
}
