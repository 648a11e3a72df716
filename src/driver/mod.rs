//! The digit key device
//!
//! [`DigitKeyDevice`] is the context handle the host passes into every
//! write. It owns the event sink for its whole lifetime and lets at most one
//! write use it at a time:
//!
//! ```
//! use digit_keypad::driver::DigitKeyDevice;
//! use digit_keypad::keyboard::{KeyCode, RecordingSink, SinkEvent};
//!
//! let device = DigitKeyDevice::init(RecordingSink::new());
//! assert_eq!(device.write_code(b"5"), 1);
//!
//! let sink = device.teardown();
//! assert_eq!(sink.events()[0], SinkEvent::down(KeyCode::KEY_5));
//! ```

mod emitter;
mod error;
mod gate;
mod stats;

pub use emitter::KeyEventEmitter;
pub use error::WriteError;
pub use gate::{AccessGate, AccessGuard};
pub use stats::{DeviceStats, SessionReport};

use crate::keyboard::{Digit, EventSink};

/// Bytes accepted by a successful write
pub const BYTES_CONSUMED: usize = 1;

/// Virtual digit keypad bound to one event sink
#[derive(Debug)]
pub struct DigitKeyDevice<S> {
    gate: AccessGate<KeyEventEmitter<S>>,
    stats: DeviceStats,
}

impl<S: EventSink> DigitKeyDevice<S> {
    /// Take ownership of an initialized sink; the device starts free
    pub fn init(sink: S) -> Self {
        Self {
            gate: AccessGate::new(KeyEventEmitter::new(sink)),
            stats: DeviceStats::new(),
        }
    }

    /// Handle one write request.
    ///
    /// Returns the number of bytes consumed (always 1) on success. Fails
    /// with [`WriteError::Busy`] without waiting if another write holds the
    /// device.
    pub fn write(&self, input: &[u8]) -> Result<usize, WriteError> {
        self.write_digit(input).map(|_| BYTES_CONSUMED)
    }

    /// Like [`write`](Self::write), but returns the digit that was pressed
    pub fn write_digit(&self, input: &[u8]) -> Result<Digit, WriteError> {
        let outcome = match self.gate.try_acquire() {
            Some(mut emitter) => emitter.handle_write(input),
            None => Err(WriteError::Busy),
        };

        match &outcome {
            Ok(_) => {}
            Err(WriteError::Busy) => log::warn!("{}", WriteError::Busy),
            Err(e) => log::error!("{}", e),
        }
        self.stats.record(&outcome);
        outcome
    }

    /// Write-call contract: bytes consumed, or a negative errno
    pub fn write_code(&self, input: &[u8]) -> isize {
        match self.write(input) {
            Ok(consumed) => consumed as isize,
            Err(e) => e.code(),
        }
    }

    /// Direct access to the access gate
    pub fn gate(&self) -> &AccessGate<KeyEventEmitter<S>> {
        &self.gate
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Release the device and hand back the sink for destruction
    pub fn teardown(self) -> S {
        log::info!(
            "Tearing down device: {} accepted, {} rejected",
            self.stats.accepted(),
            self.stats.rejected()
        );
        self.gate.into_inner().into_sink()
    }
}
