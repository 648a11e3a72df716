//! Digit and key code definitions
//!
//! The keypad only knows ten keys. A [`Digit`] can only be built from a
//! validated value, so looking up its [`KeyCode`] never fails.

use std::fmt;

/// Represents a physical key code (Linux evdev scancode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const KEY_1: KeyCode = KeyCode(2);
    pub const KEY_2: KeyCode = KeyCode(3);
    pub const KEY_3: KeyCode = KeyCode(4);
    pub const KEY_4: KeyCode = KeyCode(5);
    pub const KEY_5: KeyCode = KeyCode(6);
    pub const KEY_6: KeyCode = KeyCode(7);
    pub const KEY_7: KeyCode = KeyCode(8);
    pub const KEY_8: KeyCode = KeyCode(9);
    pub const KEY_9: KeyCode = KeyCode(10);
    pub const KEY_0: KeyCode = KeyCode(11);

    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Display name for the key, if it is one of the digit keys
    pub fn name(&self) -> Option<&'static str> {
        DIGIT_KEYS
            .iter()
            .position(|key| key == self)
            .map(|index| KEY_NAMES[index])
    }
}

impl From<u16> for KeyCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "KEY({})", self.0),
        }
    }
}

/// Digit to key code table, indexed by digit value
pub const DIGIT_KEYS: [KeyCode; 10] = [
    KeyCode::KEY_0,
    KeyCode::KEY_1,
    KeyCode::KEY_2,
    KeyCode::KEY_3,
    KeyCode::KEY_4,
    KeyCode::KEY_5,
    KeyCode::KEY_6,
    KeyCode::KEY_7,
    KeyCode::KEY_8,
    KeyCode::KEY_9,
];

const KEY_NAMES: [&str; 10] = [
    "KEY_0", "KEY_1", "KEY_2", "KEY_3", "KEY_4", "KEY_5", "KEY_6", "KEY_7", "KEY_8", "KEY_9",
];

/// A validated digit in `0..=9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digit(u8);

impl Digit {
    /// Every digit, in ascending order
    pub const ALL: [Digit; 10] = [
        Digit(0),
        Digit(1),
        Digit(2),
        Digit(3),
        Digit(4),
        Digit(5),
        Digit(6),
        Digit(7),
        Digit(8),
        Digit(9),
    ];

    /// Build a digit from a numeric value, `None` outside `0..=9`
    pub fn new(value: u8) -> Option<Self> {
        (value <= 9).then_some(Self(value))
    }

    /// Convert an ASCII byte by its offset from `'0'`
    pub fn from_ascii(byte: u8) -> Option<Self> {
        byte.checked_sub(b'0').and_then(Self::new)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_ascii(self) -> u8 {
        b'0' + self.0
    }

    /// Key code this digit presses
    pub fn key_code(self) -> KeyCode {
        DIGIT_KEYS[usize::from(self.0)]
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
