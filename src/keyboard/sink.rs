//! Outbound event sinks
//!
//! The driver core only talks to an [`EventSink`]. On Linux the real sink is
//! a uinput virtual keyboard; the sinks here record or log events instead.

use super::KeyCode;
use std::io;

/// Type of keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventType {
    /// Key was pressed down
    Press,
    /// Key was released
    Release,
}

impl KeyEventType {
    pub fn from_pressed(pressed: bool) -> Self {
        if pressed {
            KeyEventType::Press
        } else {
            KeyEventType::Release
        }
    }

    /// Value carried by an `EV_KEY` event (1 = press, 0 = release)
    pub fn value(self) -> i32 {
        match self {
            KeyEventType::Press => 1,
            KeyEventType::Release => 0,
        }
    }
}

/// Host input-event channel that downstream listeners observe.
///
/// `sync` is a barrier: every key reported before it must be visible to
/// listeners before it returns.
pub trait EventSink {
    /// Report a key state change
    fn report_key(&mut self, key: KeyCode, pressed: bool) -> io::Result<()>;

    /// Flush all reported events to listeners
    fn sync(&mut self) -> io::Result<()>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn report_key(&mut self, key: KeyCode, pressed: bool) -> io::Result<()> {
        (**self).report_key(key, pressed)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// An event as observed at the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Key {
        key: KeyCode,
        event_type: KeyEventType,
    },
    Sync,
}

impl SinkEvent {
    pub fn down(key: KeyCode) -> Self {
        SinkEvent::Key {
            key,
            event_type: KeyEventType::Press,
        }
    }

    pub fn up(key: KeyCode) -> Self {
        SinkEvent::Key {
            key,
            event_type: KeyEventType::Release,
        }
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, in emission order
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Drain recorded events
    pub fn take_events(&mut self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for RecordingSink {
    fn report_key(&mut self, key: KeyCode, pressed: bool) -> io::Result<()> {
        self.events.push(SinkEvent::Key {
            key,
            event_type: KeyEventType::from_pressed(pressed),
        });
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.events.push(SinkEvent::Sync);
        Ok(())
    }
}

/// Dry-run sink: logs events instead of injecting them
#[derive(Debug, Default)]
pub struct LogSink {
    pending: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for LogSink {
    fn report_key(&mut self, key: KeyCode, pressed: bool) -> io::Result<()> {
        log::debug!("{} {:?}", key, KeyEventType::from_pressed(pressed));
        self.pending += 1;
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        log::debug!("SYN_REPORT ({} event(s))", self.pending);
        self.pending = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingSink::new();
        sink.report_key(KeyCode::KEY_3, true).unwrap();
        sink.sync().unwrap();
        sink.report_key(KeyCode::KEY_3, false).unwrap();

        assert_eq!(
            sink.events(),
            &[
                SinkEvent::down(KeyCode::KEY_3),
                SinkEvent::Sync,
                SinkEvent::up(KeyCode::KEY_3),
            ]
        );
    }

    #[test]
    fn take_events_drains() {
        let mut sink = RecordingSink::new();
        sink.sync().unwrap();
        assert_eq!(sink.take_events().len(), 1);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn boxed_sink_forwards() {
        let mut sink: Box<RecordingSink> = Box::new(RecordingSink::new());
        EventSink::report_key(&mut sink, KeyCode::KEY_0, false).unwrap();
        EventSink::sync(&mut sink).unwrap();
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn event_type_values() {
        assert_eq!(KeyEventType::Press.value(), 1);
        assert_eq!(KeyEventType::Release.value(), 0);
        assert_eq!(KeyEventType::from_pressed(true), KeyEventType::Press);
    }
}
