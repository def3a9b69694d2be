//! # Event Stream Registry
//!
//! Named event channels shared by the host listener and the emitting
//! operation.
//!
//! ## Lifecycle
//!
//! 1. The host creates a channel by name ([`EventStreamRegistry::register`]).
//! 2. The host takes the receiving side once ([`EventChannelHandle::listen`]).
//! 3. An operation started with that name pushes events on the handle.
//! 4. The entry leaves the registry exactly once, on whichever happens first:
//!    the operation terminates ([`finish`](EventChannelHandle::finish),
//!    [`fail`](EventChannelHandle::fail)) or the host cancels
//!    ([`cancel`](EventChannelHandle::cancel)).
//!
//! Registering a name that is taken replaces the previous handle without
//! cancelling it; the old handle can no longer remove its successor.
//!
//! Until the receiver is taken, a handle buffers at most
//! [`UNLISTENED_BACKLOG`] data and error events and drops the rest.
//! End-of-stream and the failure error are always delivered.

use core_runtime::events::{event_channel, ErrorPayload, EventReceiver, EventSender};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

/// Events buffered for a channel nobody listens to yet
pub const UNLISTENED_BACKLOG: usize = 256;

type ChannelMap = Mutex<HashMap<String, Arc<EventChannelHandle>>>;

fn lock_channels(channels: &ChannelMap) -> MutexGuard<'_, HashMap<String, Arc<EventChannelHandle>>> {
    // Critical sections never panic midway; a poisoned map is still consistent.
    channels
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of event channels keyed by name
#[derive(Clone, Default)]
pub struct EventStreamRegistry {
    channels: Arc<ChannelMap>,
}

impl EventStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel under `name`, replacing any previous one
    pub fn register(&self, name: &str) -> Arc<EventChannelHandle> {
        let handle = Arc::new(EventChannelHandle::new(name, Arc::downgrade(&self.channels)));
        let previous = lock_channels(&self.channels).insert(name.to_string(), Arc::clone(&handle));

        if previous.is_some() {
            debug!(channel = name, "Replaced event channel");
        } else {
            debug!(channel = name, "Registered event channel");
        }
        handle
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<EventChannelHandle>> {
        lock_channels(&self.channels).get(name).cloned()
    }

    /// Remove `handle` if its name still refers to it.
    ///
    /// Returns `true` when the entry was removed.
    pub fn unregister(&self, handle: &EventChannelHandle) -> bool {
        remove_if_same(&self.channels, handle)
    }

    pub fn len(&self) -> usize {
        lock_channels(&self.channels).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_if_same(channels: &ChannelMap, handle: &EventChannelHandle) -> bool {
    let mut channels = lock_channels(channels);
    let same = channels
        .get(handle.name())
        .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), handle));

    if same {
        channels.remove(handle.name());
        debug!(channel = handle.name(), "Unregistered event channel");
    }
    same
}

/// One named push stream
///
/// Pushing after the stream ended or was cancelled is a no-op.
pub struct EventChannelHandle {
    name: String,
    sender: EventSender,
    receiver: Mutex<Option<EventReceiver>>,
    cancel_token: CancellationToken,
    released: AtomicBool,
    listened: AtomicBool,
    backlog: AtomicUsize,
    registry: Weak<ChannelMap>,
}

impl EventChannelHandle {
    fn new(name: &str, registry: Weak<ChannelMap>) -> Self {
        let (sender, receiver) = event_channel();
        Self {
            name: name.to_string(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            cancel_token: CancellationToken::new(),
            released: AtomicBool::new(false),
            listened: AtomicBool::new(false),
            backlog: AtomicUsize::new(0),
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the receiving side; only the first call gets it
    pub fn listen(&self) -> Option<EventReceiver> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if receiver.is_some() {
            self.listened.store(true, Ordering::Release);
        }
        receiver
    }

    pub fn push_data(&self, value: Value) -> bool {
        self.admit() && self.sender.send_data(value)
    }

    pub fn push_error(&self, error: ErrorPayload) -> bool {
        self.admit() && self.sender.send_error(error)
    }

    fn admit(&self) -> bool {
        if self.listened.load(Ordering::Acquire) {
            return true;
        }
        let queued = self.backlog.fetch_add(1, Ordering::AcqRel);
        if queued == UNLISTENED_BACKLOG {
            warn!(
                channel = %self.name,
                backlog = UNLISTENED_BACKLOG,
                "Event channel has no listener; dropping events"
            );
        }
        queued < UNLISTENED_BACKLOG
    }

    /// Push the end-of-stream marker and leave the registry
    pub fn finish(&self) {
        self.sender.end_of_stream();
        self.release();
    }

    /// Push one error, end the stream without a marker and leave the registry
    pub fn fail(&self, error: ErrorPayload) {
        self.sender.send_error(error);
        self.sender.close();
        self.release();
    }

    /// End the stream without pushing anything and leave the registry
    pub fn close(&self) {
        self.sender.close();
        self.release();
    }

    /// Stop the emitting operation and leave the registry. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel_token.is_cancelled() {
            debug!(channel = %self.name, "Event channel cancelled");
        }
        self.cancel_token.cancel();
        self.sender.close();
        self.release();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once the channel is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel_token.cancelled()
    }

    /// Token observed by the emitting operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.sender.is_ended()
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(channels) = self.registry.upgrade() {
            remove_if_same(&channels, self);
        }
    }
}

impl std::fmt::Debug for EventChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannelHandle")
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .field("ended", &self.is_ended())
            .finish()
    }
}
