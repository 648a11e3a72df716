//! Key codes, digits and the event sinks they are reported to

pub mod keymap;
mod sink;
mod uinput;

pub use keymap::{Digit, KeyCode, DIGIT_KEYS};
pub use sink::{EventSink, KeyEventType, LogSink, RecordingSink, SinkEvent};
pub use uinput::{is_uinput_available, uinput_status, UinputError, UinputSink};
