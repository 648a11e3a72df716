//! Write path errors

use nix::errno::Errno;
use std::io;
use thiserror::Error;

/// Error returned by a single write request
#[derive(Debug, Error)]
pub enum WriteError {
    /// Another write is in progress
    #[error("Device is in use by another process")]
    Busy,
    /// Zero-length write
    #[error("Empty write. Enter a single digit (0-9)")]
    EmptyInput,
    /// First byte is not an ASCII digit
    #[error("Invalid input {0:#04x}. Please write a single digit (0-9)")]
    InvalidDigit(u8),
    /// The event sink failed while emitting
    #[error("Event sink error: {0}")]
    Sink(#[from] io::Error),
}

impl WriteError {
    /// errno reported to the writer
    pub fn errno(&self) -> Errno {
        match self {
            WriteError::Busy => Errno::EBUSY,
            WriteError::EmptyInput | WriteError::InvalidDigit(_) => Errno::EINVAL,
            WriteError::Sink(_) => Errno::EIO,
        }
    }

    /// Negative errno, as a write call would return it
    pub fn code(&self) -> isize {
        -(self.errno() as isize)
    }

    /// Rebuild the error a writer of `input` was answered with.
    ///
    /// Returns `None` for non-negative codes.
    pub fn from_code(code: isize, input: &[u8]) -> Option<Self> {
        if code >= 0 {
            return None;
        }
        let errno = -code;
        Some(if errno == Errno::EBUSY as isize {
            WriteError::Busy
        } else if errno == Errno::EINVAL as isize {
            match input.first() {
                Some(&byte) => WriteError::InvalidDigit(byte),
                None => WriteError::EmptyInput,
            }
        } else {
            let raw = i32::try_from(errno).unwrap_or(Errno::EIO as i32);
            WriteError::Sink(io::Error::from_raw_os_error(raw))
        })
    }
}
