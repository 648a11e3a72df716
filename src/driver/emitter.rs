//! Digit validation and key press emission

use super::WriteError;
use crate::keyboard::{Digit, EventSink, KeyCode};
use std::io;

/// Turns one written byte into a full keystroke on the sink
#[derive(Debug)]
pub struct KeyEventEmitter<S> {
    sink: S,
}

impl<S: EventSink> KeyEventEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Validate the first byte of `input` and press the matching key.
    ///
    /// Only the first byte is consumed; anything after it is ignored. No
    /// event reaches the sink unless the byte is an ASCII digit.
    pub fn handle_write(&mut self, input: &[u8]) -> Result<Digit, WriteError> {
        let &byte = input.first().ok_or(WriteError::EmptyInput)?;
        let digit = Digit::from_ascii(byte).ok_or(WriteError::InvalidDigit(byte))?;
        self.press(digit)?;
        Ok(digit)
    }

    /// Emit down, barrier, up, barrier for a digit
    pub fn press(&mut self, digit: Digit) -> Result<(), WriteError> {
        let key = digit.key_code();

        self.sink.report_key(key, true)?;

        if let Err(e) = self.sink.sync().and_then(|()| self.release(key)) {
            // The key-down may already be visible; don't leave the key held
            log::error!("Key press for digit {} failed: {}", digit, e);
            let _ = self.sink.report_key(key, false);
            let _ = self.sink.sync();
            return Err(e.into());
        }

        log::info!("Simulated key press for digit {}", digit);
        Ok(())
    }

    fn release(&mut self, key: KeyCode) -> io::Result<()> {
        self.sink.report_key(key, false)?;
        self.sink.sync()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
