//! Device node
//!
//! The node is a Unix `SOCK_SEQPACKET` socket. Every message a writer sends
//! is one write request, however long it is, and the writer gets the result
//! back on the same connection: the bytes consumed, or a negative errno.
//! Each connection is served on its own thread, so overlapping writers
//! really do contend for the device.

use crate::config::NodeConfig;
use crate::driver::{DigitKeyDevice, WriteError};
use crate::keyboard::{Digit, EventSink};
use nix::errno::Errno;
use nix::sys::socket::{
    bind, connect, listen, socket, AddressFamily, Backlog, SockFlag, SockType, UnixAddr,
};
use std::fs::{self, Permissions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Bytes of a request that are looked at; the rest of a longer message is
/// discarded by the socket
const READ_BUFFER_SIZE: usize = 64;

/// Reply: the write result as a little-endian i64
const REPLY_SIZE: usize = 8;

/// Error type for device node operations
#[derive(Debug, Error)]
pub enum NodeError {
    /// Something other than a socket already lives at the path
    #[error("{} exists and is not a device node", .0.display())]
    Exists(PathBuf),
    /// Another keypad is serving the path
    #[error("{} is already served by a running device", .0.display())]
    InUse(PathBuf),
    /// Socket setup failed
    #[error("Socket error on {}: {}", .0.display(), .1)]
    Socket(PathBuf, Errno),
    /// No device is serving the node
    #[error("No device is listening on {}", .0.display())]
    NotRunning(PathBuf),
    /// The device answered with an error
    #[error("Device rejected write: {0}")]
    Device(#[from] WriteError),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn seqpacket_socket(path: &Path) -> Result<(OwnedFd, UnixAddr), NodeError> {
    let socket_error = |e| NodeError::Socket(path.to_path_buf(), e);
    let fd = socket(
        AddressFamily::Unix,
        SockType::SeqPacket,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(socket_error)?;
    let addr = UnixAddr::new(path).map_err(socket_error)?;
    Ok((fd, addr))
}

fn connect_node(path: &Path) -> Result<UnixStream, NodeError> {
    let (fd, addr) = seqpacket_socket(path)?;
    connect(fd.as_raw_fd(), &addr).map_err(|e| match e {
        Errno::ENOENT | Errno::ECONNREFUSED => NodeError::NotRunning(path.to_path_buf()),
        e => NodeError::Socket(path.to_path_buf(), e),
    })?;
    Ok(UnixStream::from(fd))
}

/// A socket node that the host reads write requests from
#[derive(Debug)]
pub struct DeviceNode {
    path: PathBuf,
    listener: UnixListener,
    poll_interval: Duration,
}

impl DeviceNode {
    /// Create the node, replacing a stale socket left at the same path
    pub fn create(config: &NodeConfig) -> Result<Self, NodeError> {
        let path = config.path.clone();

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => match connect_node(&path) {
                Ok(_) => return Err(NodeError::InUse(path)),
                Err(NodeError::NotRunning(_)) => {
                    log::warn!("Removing stale device node {}", path.display());
                    fs::remove_file(&path)?;
                }
                Err(e) => return Err(e),
            },
            Ok(_) => return Err(NodeError::Exists(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(NodeError::Io(e)),
        }

        let (fd, addr) = seqpacket_socket(&path)?;
        bind(fd.as_raw_fd(), &addr).map_err(|e| NodeError::Socket(path.clone(), e))?;

        // From here on dropping the node removes the file
        let node = Self {
            path,
            listener: UnixListener::from(fd),
            poll_interval: config.poll_interval(),
        };
        listen(&node.listener, Backlog::MAXCONN)
            .map_err(|e| NodeError::Socket(node.path.clone(), e))?;
        node.listener.set_nonblocking(true)?;
        fs::set_permissions(&node.path, Permissions::from_mode(config.mode))?;

        log::info!("Digit key device available at {}", node.path.display());
        Ok(node)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve write requests until `shutdown` is set.
    ///
    /// Returns the number of requests handled. A fatal accept error sets
    /// `shutdown` so open connections wind down before it is returned.
    pub fn serve<S: EventSink + Send>(
        &self,
        device: &DigitKeyDevice<S>,
        shutdown: &AtomicBool,
    ) -> io::Result<u64> {
        let requests = AtomicU64::new(0);

        thread::scope(|scope| {
            while !shutdown.load(Ordering::Relaxed) {
                match self.listener.accept() {
                    Ok((stream, _)) => {
                        let requests = &requests;
                        scope.spawn(move || {
                            if let Err(e) = self.serve_connection(stream, device, shutdown, requests)
                            {
                                log::warn!("Connection closed with error: {}", e);
                            }
                        });
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(self.poll_interval)
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        shutdown.store(true, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }
            Ok(())
        })?;

        Ok(requests.into_inner())
    }

    fn serve_connection<S: EventSink>(
        &self,
        mut stream: UnixStream,
        device: &DigitKeyDevice<S>,
        shutdown: &AtomicBool,
        requests: &AtomicU64,
    ) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.poll_interval))?;
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        while !shutdown.load(Ordering::Relaxed) {
            match stream.read(&mut buffer) {
                Ok(0) => return Ok(()),
                Ok(len) => {
                    let code = device.write_code(&buffer[..len]);
                    requests.fetch_add(1, Ordering::Relaxed);
                    log::debug!("write of {} byte(s) returned {}", len, code);
                    stream.write_all(&(code as i64).to_le_bytes())?;
                }
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

impl Drop for DeviceNode {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::info!("Removed device node {}", self.path.display()),
            Err(e) => log::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Send one write request to a running device node.
///
/// Returns the bytes the device consumed. A zero-length message cannot be
/// told apart from a closed connection, so empty input is refused here.
pub fn write_request(path: &Path, input: &[u8]) -> Result<usize, NodeError> {
    if input.is_empty() {
        return Err(NodeError::Device(WriteError::EmptyInput));
    }

    let mut stream = connect_node(path)?;
    stream.write_all(input)?;

    let mut reply = [0u8; REPLY_SIZE];
    stream.read_exact(&mut reply)?;
    let code = i64::from_le_bytes(reply) as isize;

    match WriteError::from_code(code, input) {
        Some(e) => Err(NodeError::Device(e)),
        None => Ok(code as usize),
    }
}

/// Press one digit through a running device node
pub fn send_digit(path: &Path, digit: Digit) -> Result<(), NodeError> {
    write_request(path, &[digit.as_ascii()]).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::{KeyCode, RecordingSink, SinkEvent};
    use std::env;
    use std::sync::mpsc;

    fn temp_node_config(name: &str) -> NodeConfig {
        NodeConfig {
            path: env::temp_dir().join(format!(
                "digit-keypad-{}-{}",
                name,
                std::process::id()
            )),
            mode: 0o600,
            poll_interval_ms: 1,
        }
    }

    fn digit(value: u8) -> Digit {
        Digit::new(value).unwrap()
    }

    /// Run `clients` against a serving node, then stop it.
    /// Returns the clients' result and the number of requests served.
    fn serving<S: EventSink + Send, R>(
        node: &DeviceNode,
        device: &DigitKeyDevice<S>,
        clients: impl FnOnce() -> R,
    ) -> (R, u64) {
        let shutdown = AtomicBool::new(false);
        thread::scope(|scope| {
            let server = scope.spawn(|| node.serve(device, &shutdown));
            let result = clients();
            shutdown.store(true, Ordering::Relaxed);
            (result, server.join().unwrap().unwrap())
        })
    }

    /// Sink that parks inside its first key report until told to continue
    struct ParkingSink {
        events: Vec<SinkEvent>,
        entered: Option<mpsc::Sender<()>>,
        resume: Option<mpsc::Receiver<()>>,
    }

    impl EventSink for ParkingSink {
        fn report_key(&mut self, key: KeyCode, pressed: bool) -> io::Result<()> {
            if let (Some(entered), Some(resume)) = (self.entered.take(), self.resume.take()) {
                let _ = entered.send(());
                let _ = resume.recv();
            }
            self.events.push(if pressed {
                SinkEvent::down(key)
            } else {
                SinkEvent::up(key)
            });
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            self.events.push(SinkEvent::Sync);
            Ok(())
        }
    }

    #[test]
    fn create_and_remove_node() {
        let config = temp_node_config("lifecycle");
        let node = DeviceNode::create(&config).expect("Failed to create node");

        let meta = fs::metadata(node.path()).unwrap();
        assert!(meta.file_type().is_socket());
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        drop(node);
        assert!(!config.path.exists());
    }

    #[test]
    fn replaces_stale_socket() {
        let config = temp_node_config("stale");
        drop(UnixListener::bind(&config.path).unwrap());
        assert!(config.path.exists());

        let node = DeviceNode::create(&config).expect("Failed to replace stale node");
        assert!(node.path().exists());
    }

    #[test]
    fn refuses_live_node() {
        let config = temp_node_config("live");
        let _running = DeviceNode::create(&config).expect("Failed to create node");

        let result = DeviceNode::create(&config);
        assert!(matches!(result, Err(NodeError::InUse(_))));
    }

    #[test]
    fn refuses_regular_file() {
        let config = temp_node_config("regular");
        fs::write(&config.path, b"not a node").unwrap();

        let result = DeviceNode::create(&config);
        assert!(matches!(result, Err(NodeError::Exists(_))));
        assert!(config.path.exists());

        let _ = fs::remove_file(&config.path);
    }

    #[test]
    fn send_without_device_fails() {
        let config = temp_node_config("no-device");
        let result = send_digit(&config.path, digit(1));
        assert!(matches!(result, Err(NodeError::NotRunning(_))));
    }

    #[test]
    fn serves_written_digits() {
        let config = temp_node_config("serve");
        let node = DeviceNode::create(&config).expect("Failed to create node");
        let device = DigitKeyDevice::init(RecordingSink::new());

        let (sent, requests) = serving(&node, &device, || send_digit(&config.path, digit(5)));

        assert!(sent.is_ok());
        assert_eq!(requests, 1);
        let sink = device.teardown();
        assert_eq!(
            sink.events(),
            &[
                SinkEvent::down(KeyCode::KEY_5),
                SinkEvent::Sync,
                SinkEvent::up(KeyCode::KEY_5),
                SinkEvent::Sync,
            ]
        );
    }

    #[test]
    fn long_write_is_one_request() {
        let config = temp_node_config("long");
        let node = DeviceNode::create(&config).expect("Failed to create node");
        let device = DigitKeyDevice::init(RecordingSink::new());

        let (consumed, requests) =
            serving(&node, &device, || write_request(&config.path, &[b'1'; 100]));

        assert_eq!(consumed.unwrap(), 1);
        assert_eq!(requests, 1);
        assert_eq!(device.stats().accepted(), 1);
        assert_eq!(device.teardown().events().len(), 4);
    }

    #[test]
    fn separate_writes_each_get_an_answer() {
        let config = temp_node_config("separate");
        let node = DeviceNode::create(&config).expect("Failed to create node");
        let device = DigitKeyDevice::init(RecordingSink::new());

        let (results, requests) = serving(&node, &device, || {
            [
                send_digit(&config.path, digit(3)).is_ok(),
                send_digit(&config.path, digit(7)).is_ok(),
            ]
        });

        assert_eq!(results, [true, true]);
        assert_eq!(requests, 2);
        assert_eq!(device.stats().accepted(), 2);
        assert_eq!(device.teardown().events().len(), 8);
    }

    #[test]
    fn rejected_write_reaches_writer() {
        let config = temp_node_config("rejected");
        let node = DeviceNode::create(&config).expect("Failed to create node");
        let device = DigitKeyDevice::init(RecordingSink::new());

        let (result, _) = serving(&node, &device, || write_request(&config.path, b"a"));

        assert!(matches!(
            result,
            Err(NodeError::Device(WriteError::InvalidDigit(b'a')))
        ));
        assert!(matches!(
            write_request(&config.path, b""),
            Err(NodeError::Device(WriteError::EmptyInput))
        ));
        assert!(device.teardown().events().is_empty());
    }

    #[test]
    fn overlapping_writer_gets_busy() {
        let config = temp_node_config("busy");
        let node = DeviceNode::create(&config).expect("Failed to create node");
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let device = DigitKeyDevice::init(ParkingSink {
            events: Vec::new(),
            entered: Some(entered_tx),
            resume: Some(resume_rx),
        });

        let ((first, second), _) = serving(&node, &device, || {
            thread::scope(|scope| {
                let first = scope.spawn(|| send_digit(&config.path, digit(3)));

                // First writer is now parked inside its key-down report
                entered_rx.recv().unwrap();
                let second = send_digit(&config.path, digit(7));

                resume_tx.send(()).unwrap();
                (first.join().unwrap(), second)
            })
        });

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(NodeError::Device(WriteError::Busy))
        ));
        assert_eq!(device.stats().busy(), 1);

        let sink = device.teardown();
        assert_eq!(sink.events[0], SinkEvent::down(KeyCode::KEY_3));
        assert_eq!(sink.events.len(), 4);
    }
}
