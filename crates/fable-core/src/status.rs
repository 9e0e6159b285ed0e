use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide, monotonically increasing request identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn next() -> Self {
        let n = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        Self(format!("req-{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric sequence component, used to check ordering.
    pub fn sequence(&self) -> u64 {
        self.0
            .strip_prefix("req-")
            .and_then(|n| n.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one supervised request:
///
/// Processing → Warn → Danger, then Success | Abandoned (terminal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Processing,
    Warn,
    Danger,
    Success,
    Abandoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Blue,
    Yellow,
    Red,
    Green,
    Gray,
}

impl RequestStatus {
    /// Status shown while running attempt `attempt` (zero-based).
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt {
            0 => Self::Processing,
            1 => Self::Warn,
            _ => Self::Danger,
        }
    }

    pub fn color(&self) -> StatusColor {
        match self {
            Self::Processing => StatusColor::Blue,
            Self::Warn => StatusColor::Yellow,
            Self::Danger => StatusColor::Red,
            Self::Success => StatusColor::Green,
            Self::Abandoned => StatusColor::Gray,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Abandoned)
    }
}

/// What external observers receive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: String,
    pub color: StatusColor,
}

/// Fire-and-forget receiver of status events. Implementations must not block.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn emit(&self, _event: StatusEvent) {}
}

/// Forwards events into a tokio channel; a closed receiver is ignored.
#[derive(Clone, Debug)]
pub struct ChannelStatusSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelStatusSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelStatusSink {
    fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory. Handy for tests and diagnostics.
#[derive(Clone, Debug, Default)]
pub struct RecordingStatusSink {
    events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    pub fn colors(&self) -> Vec<StatusColor> {
        self.events.lock().iter().map(|e| e.color).collect()
    }
}

impl StatusSink for RecordingStatusSink {
    fn emit(&self, event: StatusEvent) {
        self.events.lock().push(event);
    }
}

/// Drives the status machine for one request id. Once a terminal state has
/// been emitted, further transitions are ignored.
pub struct StatusTracker {
    id: RequestId,
    current: Option<RequestStatus>,
    sink: Arc<dyn StatusSink>,
}

impl StatusTracker {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            id: RequestId::next(),
            current: None,
            sink,
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn current(&self) -> Option<RequestStatus> {
        self.current
    }

    /// Returns false when the transition was ignored.
    pub fn transition(&mut self, status: RequestStatus) -> bool {
        if self.current.is_some_and(|s| s.is_terminal()) {
            return false;
        }
        self.current = Some(status);
        self.sink.emit(StatusEvent {
            id: self.id.to_string(),
            color: status.color(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_index_maps_to_status() {
        assert_eq!(RequestStatus::for_attempt(0), RequestStatus::Processing);
        assert_eq!(RequestStatus::for_attempt(1), RequestStatus::Warn);
        assert_eq!(RequestStatus::for_attempt(2), RequestStatus::Danger);
        assert_eq!(RequestStatus::for_attempt(7), RequestStatus::Danger);
    }

    #[test]
    fn colors() {
        assert_eq!(RequestStatus::Processing.color(), StatusColor::Blue);
        assert_eq!(RequestStatus::Warn.color(), StatusColor::Yellow);
        assert_eq!(RequestStatus::Danger.color(), StatusColor::Red);
        assert_eq!(RequestStatus::Success.color(), StatusColor::Green);
        assert_eq!(RequestStatus::Abandoned.color(), StatusColor::Gray);
        assert_eq!(serde_json::to_string(&StatusColor::Gray).unwrap(), r#""gray""#);
    }

    #[test]
    fn request_ids_increase() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b.sequence() > a.sequence());
        assert!(a.as_str().starts_with("req-"));
    }

    #[test]
    fn terminal_state_is_never_left() {
        let sink = RecordingStatusSink::new();
        let mut tracker = StatusTracker::new(Arc::new(sink.clone()));
        assert!(tracker.transition(RequestStatus::Processing));
        assert!(tracker.transition(RequestStatus::Success));
        assert!(!tracker.transition(RequestStatus::Warn));
        assert!(!tracker.transition(RequestStatus::Abandoned));
        assert_eq!(tracker.current(), Some(RequestStatus::Success));
        assert_eq!(sink.colors(), vec![StatusColor::Blue, StatusColor::Green]);
        assert!(sink.events().iter().all(|e| e.id == tracker.id().as_str()));
    }

    #[tokio::test]
    async fn channel_sink_forwards_and_tolerates_closed_receiver() {
        let (sink, mut rx) = ChannelStatusSink::new();
        sink.emit(StatusEvent {
            id: "req-1".into(),
            color: StatusColor::Blue,
        });
        assert_eq!(rx.recv().await.unwrap().color, StatusColor::Blue);
        drop(rx);
        sink.emit(StatusEvent {
            id: "req-1".into(),
            color: StatusColor::Gray,
        });
    }
}
