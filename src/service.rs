//! Device lifecycle: bring-up, serving, teardown
//!
//! Resources are acquired sink first, node second, and released in the
//! reverse order, both on a failed start and on a normal teardown.

use crate::config::Config;
use crate::driver::{DigitKeyDevice, SessionReport};
use crate::keyboard::EventSink;
use crate::node::{DeviceNode, NodeError};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use thiserror::Error;

/// Fatal errors while starting the device
#[derive(Debug, Error)]
pub enum StartupError {
    /// The event sink could not be created
    #[error("Failed to create input device: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The device node could not be created
    #[error("Failed to create device node: {0}")]
    Node(#[from] NodeError),
}

/// A running keypad: device node plus the device it feeds
pub struct KeypadService<S: EventSink> {
    // Field order is drop order: the node goes before the sink
    node: DeviceNode,
    device: DigitKeyDevice<S>,
    report_path: Option<PathBuf>,
}

impl<S: EventSink> KeypadService<S> {
    /// Create the event sink, then the node feeding it
    pub fn start<F, E>(config: &Config, make_sink: F) -> Result<Self, StartupError>
    where
        F: FnOnce() -> Result<S, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let sink = make_sink().map_err(|e| StartupError::Sink(Box::new(e)))?;
        let device = DigitKeyDevice::init(sink);
        let node = DeviceNode::create(&config.node)?;

        Ok(Self {
            node,
            device,
            report_path: config.report.path.clone(),
        })
    }

    pub fn device(&self) -> &DigitKeyDevice<S> {
        &self.device
    }

    pub fn node(&self) -> &DeviceNode {
        &self.node
    }

    /// Serve write requests until `shutdown` is set
    pub fn run(&self, shutdown: &AtomicBool) -> io::Result<u64>
    where
        S: Send,
    {
        self.node.serve(&self.device, shutdown)
    }

    /// Remove the node, write the session report, destroy the sink
    pub fn teardown(self) -> SessionReport {
        let Self {
            node,
            device,
            report_path,
        } = self;

        drop(node);

        let report = device.stats().report();
        if let Some(path) = report_path {
            match report.export_json(&path) {
                Ok(()) => log::info!("Session report written to {}", path.display()),
                Err(e) => log::warn!("Failed to write report {}: {}", path.display(), e),
            }
        }

        drop(device.teardown());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::RecordingSink;
    use std::env;
    use std::fs;
    use std::path::Path;

    fn temp_config(name: &str) -> Config {
        let mut config = Config::default();
        config.node.path = env::temp_dir().join(format!(
            "digit-keypad-service-{}-{}",
            name,
            std::process::id()
        ));
        config.node.mode = 0o600;
        config
    }

    #[test]
    fn start_and_teardown() {
        let config = temp_config("lifecycle");
        let service =
            KeypadService::start(&config, || Ok::<_, io::Error>(RecordingSink::new()))
                .expect("Failed to start");

        assert!(config.node.path.exists());
        service.device().write(b"2").unwrap();

        let report = service.teardown();
        assert_eq!(report.accepted, 1);
        assert!(!config.node.path.exists());
    }

    #[test]
    fn sink_failure_leaves_no_node() {
        let config = temp_config("sink-fail");
        let result = KeypadService::<RecordingSink>::start(&config, || {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "no uinput"))
        });

        assert!(matches!(result, Err(StartupError::Sink(_))));
        assert!(!config.node.path.exists());
    }

    #[test]
    fn node_failure_reported() {
        let config = temp_config("node-fail");
        fs::write(&config.node.path, b"occupied").unwrap();

        let result =
            KeypadService::start(&config, || Ok::<_, io::Error>(RecordingSink::new()));
        assert!(matches!(result, Err(StartupError::Node(NodeError::Exists(_)))));

        let _ = fs::remove_file(&config.node.path);
    }

    #[test]
    fn teardown_writes_report() {
        let mut config = temp_config("report");
        let report_path =
            env::temp_dir().join(format!("digit-keypad-service-report-{}.json", std::process::id()));
        config.report.path = Some(report_path.clone());

        let service =
            KeypadService::start(&config, || Ok::<_, io::Error>(RecordingSink::new()))
                .expect("Failed to start");
        let _ = service.device().write(b"a");
        service.teardown();

        assert!(Path::new(&report_path).exists());
        let _ = fs::remove_file(&report_path);
    }
}
