//! uinput-backed virtual keypad for Linux
//!
//! Registers a virtual keyboard with the kernel input subsystem that
//! advertises exactly the ten digit keys. Dropping the [`UinputSink`]
//! destroys the device.

use super::{EventSink, KeyCode, KeyEventType, DIGIT_KEYS};
use crate::config::DeviceConfig;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for uinput device creation
#[derive(Debug, Error)]
pub enum UinputError {
    /// /dev/uinput exists but cannot be opened
    #[error("Permission denied opening /dev/uinput. Try running with sudo or add user to the 'input' group")]
    PermissionDenied,
    /// uinput module not loaded
    #[error("/dev/uinput not found. Is the uinput kernel module loaded?")]
    NotAvailable,
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl UinputError {
    fn classify(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => UinputError::PermissionDenied,
            io::ErrorKind::NotFound => UinputError::NotAvailable,
            _ => UinputError::Io(e),
        }
    }
}

/// Event sink that injects key events through uinput
pub struct UinputSink {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
}

impl UinputSink {
    /// Create and register the virtual keypad
    pub fn new(config: &DeviceConfig) -> Result<Self, UinputError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in DIGIT_KEYS {
            keys.insert(Key::new(code.as_u16()));
        }

        let id = InputId::new(
            BusType::BUS_VIRTUAL,
            config.vendor,
            config.product,
            config.version,
        );

        let device = VirtualDeviceBuilder::new()
            .map_err(UinputError::classify)?
            .name(&config.name)
            .input_id(id)
            .with_keys(&keys)?
            .build()?;

        log::info!("Registered virtual input device \"{}\"", config.name);

        let mut sink = Self {
            device,
            pending: Vec::with_capacity(2),
        };
        match sink.dev_nodes() {
            Ok(paths) => {
                for path in paths {
                    log::info!("Keypad events available on {}", path.display());
                }
            }
            Err(e) => log::warn!("Could not enumerate event nodes: {}", e),
        }
        Ok(sink)
    }

    /// Event nodes (`/dev/input/eventN`) that listeners can open
    pub fn dev_nodes(&mut self) -> io::Result<Vec<PathBuf>> {
        self.device
            .enumerate_dev_nodes_blocking()?
            .collect::<io::Result<Vec<_>>>()
    }
}

impl EventSink for UinputSink {
    fn report_key(&mut self, key: KeyCode, pressed: bool) -> io::Result<()> {
        self.pending.push(InputEvent::new(
            EventType::KEY,
            key.as_u16(),
            KeyEventType::from_pressed(pressed).value(),
        ));
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        // emit() terminates the batch with SYN_REPORT
        let result = self.device.emit(&self.pending);
        self.pending.clear();
        result
    }
}

impl Drop for UinputSink {
    fn drop(&mut self) {
        log::info!("Unregistered virtual input device");
    }
}

/// Check whether /dev/uinput can be opened for writing
pub fn is_uinput_available() -> bool {
    std::fs::OpenOptions::new()
        .write(true)
        .open("/dev/uinput")
        .is_ok()
}

/// Get a status message about uinput availability
pub fn uinput_status() -> String {
    match std::fs::OpenOptions::new().write(true).open("/dev/uinput") {
        Ok(_) => "uinput available".to_string(),
        Err(e) => UinputError::classify(e).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uinput_status() {
        let status = uinput_status();
        assert!(!status.is_empty());
    }

    #[test]
    fn test_classify_errors() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            UinputError::classify(denied),
            UinputError::PermissionDenied
        ));

        let missing = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            UinputError::classify(missing),
            UinputError::NotAvailable
        ));
    }

    #[test]
    fn test_create_device() {
        // This test may fail without proper permissions
        match UinputSink::new(&DeviceConfig::default()) {
            Ok(_) => println!("Created virtual keypad"),
            Err(e) => println!("Expected error in test environment: {}", e),
        }
    }
}
