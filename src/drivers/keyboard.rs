//! PS/2 키보드 드라이버
//!
//! 이 모듈은 PS/2 키보드의 스캔 코드(set 1)를 문자로 바꾸고 입력 큐에 넣습니다.
//!
//! 큐는 단일 생산자(키보드 인터럽트)/단일 소비자(메인 컨텍스트) 링 버퍼입니다.
//! 머리/꼬리 인덱스는 원자적으로 한 번에 갱신되므로 잠금이 필요 없습니다.
//! 큐가 가득 차면 새로 들어온 문자를 버립니다.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use spin::Mutex;

use crate::arch::{Cpu, PortIo};
use crate::interrupts::pic::PIC1_OFFSET;
use crate::interrupts::Registers;
use crate::kernel::Kernel;

/// 키보드 I/O 포트
pub const KEYBOARD_DATA_PORT: u16 = 0x60;

/// 키보드 PIC 라인과 벡터
pub const KEYBOARD_IRQ_LINE: u8 = 1;
pub const KEYBOARD_VECTOR: u8 = PIC1_OFFSET + KEYBOARD_IRQ_LINE;

/// 입력 큐 슬롯 수 (한 칸은 비워 두므로 127자까지 보관)
pub const BUFFER_SIZE: usize = 128;

const SCANCODE_RELEASE: u8 = 0x80;
const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;
const CAPS_LOCK: u8 = 0x3A;

const fn keymap(prefix: &[u8]) -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < prefix.len() {
        table[i] = prefix[i];
        i += 1;
    }
    table
}

/// US 배열, shift 없음 (0 = 매핑 없음)
static SCANCODE_TABLE: [u8; 128] = keymap(&[
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ', 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, b'-', 0, 0, 0, b'+',
]);

/// US 배열, shift 눌림
static SCANCODE_TABLE_SHIFT: [u8; 128] = keymap(&[
    0, 27, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ', 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, b'_', 0, 0, 0, b'+',
]);

/// 수정자 키 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub caps_lock: bool,
}

/// 스캔 코드 → 문자 상태 기계
#[derive(Debug, Default)]
pub struct ScancodeDecoder {
    modifiers: Modifiers,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            modifiers: Modifiers {
                shift: false,
                caps_lock: false,
            },
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn reset(&mut self) {
        self.modifiers = Modifiers::default();
    }

    /// 스캔 코드 하나 처리
    ///
    /// 수정자 키와 키 떼기는 상태만 바꾸고 `None`을 돌려줍니다.
    /// caps lock은 글자에만 적용됩니다 (shift와 XOR).
    pub fn process(&mut self, scancode: u8) -> Option<u8> {
        if scancode & SCANCODE_RELEASE != 0 {
            let code = scancode & !SCANCODE_RELEASE;
            if code == LEFT_SHIFT || code == RIGHT_SHIFT {
                self.modifiers.shift = false;
            }
            return None;
        }

        match scancode {
            LEFT_SHIFT | RIGHT_SHIFT => {
                self.modifiers.shift = true;
                return None;
            }
            CAPS_LOCK => {
                self.modifiers.caps_lock = !self.modifiers.caps_lock;
                return None;
            }
            _ => {}
        }

        let plain = SCANCODE_TABLE[usize::from(scancode)];
        let mut use_shift = self.modifiers.shift;
        if plain.is_ascii_lowercase() {
            use_shift ^= self.modifiers.caps_lock;
        }

        let byte = if use_shift {
            SCANCODE_TABLE_SHIFT[usize::from(scancode)]
        } else {
            plain
        };
        (byte != 0).then_some(byte)
    }
}

/// SPSC 링 버퍼
pub struct KeyBuffer<const N: usize> {
    slots: UnsafeCell<[u8; N]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    dropped: AtomicU32,
}

// SAFETY: 생산자는 `head` 슬롯만, 소비자는 `tail` 슬롯만 만지며
// 인덱스는 Release/Acquire로 공개됩니다.
unsafe impl<const N: usize> Sync for KeyBuffer<N> {}

impl<const N: usize> KeyBuffer<N> {
    pub const fn new() -> Self {
        Self {
            slots: UnsafeCell::new([0; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// 생산자 전용. 가득 차면 `false` (문자는 버려짐)
    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % N;
        if next == self.tail.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // SAFETY: `head` 슬롯은 소비자가 아직 볼 수 없는 자리입니다.
        unsafe { self.slots.get().cast::<u8>().add(head).write(byte) };
        self.head.store(next, Ordering::Release);
        true
    }

    /// 소비자 전용
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: `tail` 슬롯은 생산자가 이미 공개한 자리입니다.
        let byte = unsafe { self.slots.get().cast::<u8>().add(tail).read() };
        self.tail.store((tail + 1) % N, Ordering::Release);
        Some(byte)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }

    /// 가득 차서 버린 문자 수
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 큐 비우기 (인터럽트가 꺼진 상태에서만)
    pub fn clear(&self) {
        self.tail.store(self.head.load(Ordering::Acquire), Ordering::Release);
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl<const N: usize> Default for KeyBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// 키보드 상태 (디코더 + 입력 큐)
pub struct Keyboard {
    // 키보드 인터럽트 안에서만 잠급니다.
    decoder: Mutex<ScancodeDecoder>,
    buffer: KeyBuffer<BUFFER_SIZE>,
}

impl Keyboard {
    pub const fn new() -> Self {
        Self {
            decoder: Mutex::new(ScancodeDecoder::new()),
            buffer: KeyBuffer::new(),
        }
    }

    /// 큐와 수정자 키 초기화 (인터럽트가 꺼진 상태에서만)
    pub(crate) fn reset(&self) {
        self.buffer.clear();
        self.decoder.lock().reset();
    }

    /// 스캔 코드 하나를 디코딩해서 큐에 넣기
    ///
    /// 큐의 유일한 생산자이므로 키보드 인터럽트에서만 호출합니다.
    pub(crate) fn handle_scancode(&self, scancode: u8) {
        let decoded = self.decoder.lock().process(scancode);
        if let Some(byte) = decoded {
            if !self.buffer.push(byte) {
                crate::log_trace!("Keyboard buffer full, dropping {:#04x}", byte);
            }
        }
    }

    pub fn has_char(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn try_get_char(&self) -> Option<char> {
        self.buffer.pop().map(char::from)
    }

    /// 문자가 들어올 때까지 `idle`을 반복 호출
    pub fn get_char(&self, mut idle: impl FnMut()) -> char {
        loop {
            if let Some(ch) = self.try_get_char() {
                return ch;
            }
            idle();
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn dropped(&self) -> u32 {
        self.buffer.dropped()
    }

    #[cfg(test)]
    pub(crate) fn modifiers(&self) -> Modifiers {
        self.decoder.lock().modifiers()
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

/// 키보드 인터럽트 핸들러
///
/// IRQ 1 (인터럽트 33)에서 호출됩니다.
pub(crate) fn handle_interrupt<P: PortIo, C: Cpu>(kernel: &Kernel<P, C>, _regs: &Registers) {
    let scancode = kernel.ports().read_byte(KEYBOARD_DATA_PORT);
    kernel.keyboard().handle_scancode(scancode);
}
