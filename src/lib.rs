//! Digit Keypad - virtual numeric keypad for Linux
//!
//! Exposes a device node that accepts a single ASCII digit per write and
//! turns it into a press and release of the matching key on a uinput
//! virtual keyboard.

pub mod config;
pub mod driver;
pub mod keyboard;
pub mod node;
pub mod service;

pub use config::Config;
pub use driver::{DigitKeyDevice, WriteError};
pub use service::KeypadService;
