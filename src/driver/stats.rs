//! Write outcome counters and session report

use super::WriteError;
use crate::keyboard::Digit;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters updated on every write; safe to read from any thread
#[derive(Debug)]
pub struct DeviceStats {
    started: Instant,
    accepted: AtomicU64,
    busy: AtomicU64,
    empty: AtomicU64,
    invalid: AtomicU64,
    sink_errors: AtomicU64,
    per_digit: [AtomicU64; 10],
}

impl DeviceStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            accepted: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            empty: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            per_digit: Default::default(),
        }
    }

    pub fn record(&self, outcome: &Result<Digit, WriteError>) {
        let counter = match outcome {
            Ok(digit) => {
                self.per_digit[usize::from(digit.value())].fetch_add(1, Ordering::Relaxed);
                &self.accepted
            }
            Err(WriteError::Busy) => &self.busy,
            Err(WriteError::EmptyInput) => &self.empty,
            Err(WriteError::InvalidDigit(_)) => &self.invalid,
            Err(WriteError::Sink(_)) => &self.sink_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.busy.load(Ordering::Relaxed)
            + self.empty.load(Ordering::Relaxed)
            + self.invalid.load(Ordering::Relaxed)
            + self.sink_errors.load(Ordering::Relaxed)
    }

    pub fn busy(&self) -> u64 {
        self.busy.load(Ordering::Relaxed)
    }

    pub fn presses(&self, digit: Digit) -> u64 {
        self.per_digit[usize::from(digit.value())].load(Ordering::Relaxed)
    }

    /// Point-in-time copy for export
    pub fn report(&self) -> SessionReport {
        SessionReport {
            generated_at: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            duration_secs: self.started.elapsed().as_secs_f64(),
            accepted: self.accepted(),
            busy: self.busy(),
            empty: self.empty.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            per_digit: Digit::ALL.map(|digit| self.presses(digit)),
        }
    }
}

impl Default for DeviceStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one device session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report generation timestamp
    pub generated_at: String,
    /// Application version
    pub version: String,
    /// Time since the device was initialized
    pub duration_secs: f64,
    pub accepted: u64,
    pub busy: u64,
    pub empty: u64,
    pub invalid: u64,
    pub sink_errors: u64,
    /// Accepted presses, indexed by digit
    pub per_digit: [u64; 10],
}

impl SessionReport {
    /// Export report to JSON file
    pub fn export_json(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
