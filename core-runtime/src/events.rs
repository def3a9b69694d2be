//! # Event Channel Primitives
//!
//! Push streams carrying operation progress from the core to the host.
//!
//! ## Overview
//!
//! Every streaming operation owns exactly one channel. Unlike a broadcast
//! bus, a channel has a single producer side ([`EventSender`]) held by the
//! operation and a single consumer side ([`EventReceiver`]) handed to the
//! host listener.
//!
//! ```text
//! ┌────────────────┐  Data / Error / EndOfStream  ┌───────────────┐
//! │ Sync operation ├─────────────────────────────>│ Host listener │
//! └────────────────┘        (unbounded mpsc)      └───────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{event_channel, ChannelEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (sender, mut receiver) = event_channel();
//!
//! sender.send_data(serde_json::json!(42.0));
//! sender.end_of_stream();
//!
//! assert_eq!(receiver.recv().await, Some(ChannelEvent::Data(serde_json::json!(42.0))));
//! assert_eq!(receiver.recv().await, Some(ChannelEvent::EndOfStream));
//! # }
//! ```
//!
//! ## Termination
//!
//! [`EventSender::end_of_stream`] latches: the marker is delivered once and
//! every later push is dropped. Dropping every sender closes the stream
//! without a marker, which is what a cancelled operation looks like from the
//! host side.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Error pushed to the host, shaped like a platform channel error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Stable error code (e.g. `E_NAT`)
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Opaque native detail text
    pub details: Option<String>,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {} ({})", self.code, self.message, details),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// One item pushed on an event channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ChannelEvent {
    /// A progress value or a status snapshot
    Data(Value),
    /// A failure observed by the operation
    Error(ErrorPayload),
    /// The stream ended; nothing follows
    EndOfStream,
}

impl ChannelEvent {
    pub fn description(&self) -> &str {
        match self {
            ChannelEvent::Data(_) => "Data",
            ChannelEvent::Error(_) => "Error",
            ChannelEvent::EndOfStream => "End of stream",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelEvent::EndOfStream)
    }
}

/// Create a connected sender/receiver pair
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EventSender {
            inner: Arc::new(Mutex::new(SenderState {
                sender,
                ended: false,
            })),
        },
        EventReceiver { receiver },
    )
}

struct SenderState {
    sender: mpsc::UnboundedSender<ChannelEvent>,
    ended: bool,
}

/// Producer side of an event channel
#[derive(Clone)]
pub struct EventSender {
    inner: Arc<Mutex<SenderState>>,
}

impl EventSender {
    /// Push a value. Returns `false` if the stream already ended.
    pub fn send_data(&self, value: Value) -> bool {
        self.push(ChannelEvent::Data(value))
    }

    /// Push an error. Returns `false` if the stream already ended.
    pub fn send_error(&self, error: ErrorPayload) -> bool {
        self.push(ChannelEvent::Error(error))
    }

    /// Push the end-of-stream marker.
    ///
    /// Returns `true` only for the call that actually ended the stream.
    pub fn end_of_stream(&self) -> bool {
        let Ok(mut state) = self.inner.lock() else {
            return false;
        };
        if state.ended {
            return false;
        }
        state.ended = true;
        // A vanished receiver still counts as ended.
        let _ = state.sender.send(ChannelEvent::EndOfStream);
        true
    }

    /// End the stream without a marker.
    ///
    /// Used for cancellation: the listener sees the stream close once every
    /// sender is dropped. Returns `true` only for the call that ended it.
    pub fn close(&self) -> bool {
        let Ok(mut state) = self.inner.lock() else {
            return false;
        };
        let first = !state.ended;
        state.ended = true;
        first
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().map(|state| state.ended).unwrap_or(true)
    }

    fn push(&self, event: ChannelEvent) -> bool {
        let Ok(state) = self.inner.lock() else {
            return false;
        };
        if state.ended {
            return false;
        }
        state.sender.send(event).is_ok()
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Consumer side of an event channel
#[derive(Debug)]
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl EventReceiver {
    /// Wait for the next event; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.recv().await
    }

    /// Take the next event if one is ready
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.try_recv().ok()
    }

    /// Collect events until the end-of-stream marker or until the stream closes
    pub async fn collect_until_end(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sender, mut receiver) = event_channel();

        assert!(sender.send_data(json!(10.0)));
        assert!(sender.send_error(ErrorPayload::new("E_NAT", "Native Code Error")));
        assert!(sender.send_data(json!(20.0)));

        assert_eq!(receiver.recv().await, Some(ChannelEvent::Data(json!(10.0))));
        assert!(matches!(receiver.recv().await, Some(ChannelEvent::Error(_))));
        assert_eq!(receiver.recv().await, Some(ChannelEvent::Data(json!(20.0))));
    }

    #[tokio::test]
    async fn test_end_of_stream_latches() {
        let (sender, mut receiver) = event_channel();

        assert!(sender.end_of_stream());
        assert!(!sender.end_of_stream());
        assert!(!sender.send_data(json!(1)));
        assert!(sender.is_ended());
        drop(sender);

        let events = receiver.collect_until_end().await;
        assert_eq!(events, vec![ChannelEvent::EndOfStream]);
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_suppresses_marker() {
        let (sender, mut receiver) = event_channel();

        assert!(sender.close());
        assert!(!sender.close());
        assert!(!sender.end_of_stream());
        assert!(!sender.send_data(json!(1)));
        drop(sender);

        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropping_senders_closes_without_marker() {
        let (sender, mut receiver) = event_channel();
        let clone = sender.clone();
        sender.send_data(json!("a"));
        drop(sender);
        drop(clone);

        let events = receiver.collect_until_end().await;
        assert_eq!(events, vec![ChannelEvent::Data(json!("a"))]);
    }

    #[test]
    fn test_try_recv_empty() {
        let (_sender, mut receiver) = event_channel();
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_error_payload_display() {
        let payload = ErrorPayload::new("E_NAT", "Native Code Error").with_details("disk full");
        assert_eq!(payload.to_string(), "E_NAT: Native Code Error (disk full)");
    }

    #[test]
    fn test_event_serialization() {
        let event = ChannelEvent::Error(ErrorPayload::new("E_FNF", "The file does not exist"));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("E_FNF"));

        let deserialized: ChannelEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
