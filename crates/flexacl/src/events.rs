//! Notifications emitted after successful state transitions.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::types::{AttachPoint, Direction, ObjectKind};

/// An ACL core event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclEvent {
    ObjectDeleted { kind: ObjectKind, id: u64 },
    /// An activity bit that was set has been read and cleared.
    ActivityCleared { region: u64, offset: u32 },
    BindingChanged { point: AttachPoint, direction: Direction },
    RegionResized { region: u64, hw_size: u32 },
}

impl AclEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AclEvent::ObjectDeleted { .. } => EventKind::ObjectDeleted,
            AclEvent::ActivityCleared { .. } => EventKind::ActivityCleared,
            AclEvent::BindingChanged { .. } => EventKind::BindingChanged,
            AclEvent::RegionResized { .. } => EventKind::RegionResized,
        }
    }
}

/// Event kinds a caller can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ObjectDeleted,
    ActivityCleared,
    BindingChanged,
    RegionResized,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ObjectDeleted => "OBJECT_DELETED",
            EventKind::ActivityCleared => "ACTIVITY_CLEARED",
            EventKind::BindingChanged => "BINDING_CHANGED",
            EventKind::RegionResized => "REGION_RESIZED",
        };
        write!(f, "{}", s)
    }
}

/// Receiver of core events.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: AclEvent);
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<AclEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<AclEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn notify(&self, event: AclEvent) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AclEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and forgets the recorded events.
    pub fn take(&self) -> Vec<AclEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: AclEvent) {
        self.events.lock().push(event);
    }
}

/// Subscriptions and the installed sink.
#[derive(Clone, Default)]
pub struct EventHub {
    sink: Option<Arc<dyn EventSink>>,
    interest: HashSet<EventKind>,
}

impl EventHub {
    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = Some(sink);
    }

    pub fn subscribe(&mut self, kind: EventKind) {
        self.interest.insert(kind);
    }

    pub fn unsubscribe(&mut self, kind: EventKind) {
        self.interest.remove(&kind);
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.interest.contains(&kind)
    }

    pub fn emit(&self, event: AclEvent) {
        if !self.interest.contains(&event.kind()) {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.notify(event);
        }
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("sink", &self.sink.is_some())
            .field("interest", &self.interest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexacl_hw::PortId;

    #[test]
    fn test_only_subscribed_kinds_are_delivered() {
        let sink = Arc::new(RecordingSink::new());
        let mut hub = EventHub::default();
        hub.set_sink(sink.clone());
        hub.subscribe(EventKind::RegionResized);

        hub.emit(AclEvent::ObjectDeleted {
            kind: ObjectKind::Acl,
            id: 1,
        });
        hub.emit(AclEvent::RegionResized {
            region: 2,
            hw_size: 64,
        });
        assert_eq!(
            sink.take(),
            vec![AclEvent::RegionResized {
                region: 2,
                hw_size: 64
            }]
        );

        hub.unsubscribe(EventKind::RegionResized);
        hub.emit(AclEvent::RegionResized {
            region: 2,
            hw_size: 128,
        });
        assert!(sink.is_empty());
    }

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        let event = AclEvent::BindingChanged {
            point: AttachPoint::Port(PortId(100)),
            direction: Direction::Ingress,
        };
        sink.notify(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelSink::new(tx).notify(AclEvent::ActivityCleared {
            region: 1,
            offset: 0,
        });
    }
}
