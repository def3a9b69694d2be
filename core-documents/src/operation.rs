//! # Sync Operation State Machine
//!
//! Tracks the lifecycle of one host request with validated transitions.
//!
//! ## State Machine
//!
//! ```text
//! Created → ResolvingContainer → Active → Completed
//!                  │               ├────→ Cancelled
//!                  │               └────→ Failed
//!                  ├──────────────────→ Completed   (one-shot operations)
//!                  └──────────────────→ Failed      (container or copy failure)
//! ```
//!
//! Terminal states accept no further transition.

use crate::error::{DocumentError, ErrorKind, Result};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncOperationId(Uuid);

impl SyncOperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncOperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncOperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Kind & State
// ============================================================================

/// What an operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Gather,
    Upload,
    Download,
    Delete,
    Move,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Gather => "gather",
            OperationKind::Upload => "upload",
            OperationKind::Download => "download",
            OperationKind::Delete => "delete",
            OperationKind::Move => "move",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Created,
    ResolvingContainer,
    /// Observing a live query
    Active,
    Completed,
    Cancelled,
    Failed(FailureKind),
}

/// Failure category recorded on a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidArgument,
    ContainerUnavailable,
    FileNotFound,
    NativeIo,
}

impl From<ErrorKind> for FailureKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidArgument => FailureKind::InvalidArgument,
            ErrorKind::ContainerUnavailable => FailureKind::ContainerUnavailable,
            ErrorKind::FileNotFound => FailureKind::FileNotFound,
            ErrorKind::NativeIo => FailureKind::NativeIo,
        }
    }
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Created => "created",
            OperationState::ResolvingContainer => "resolving_container",
            OperationState::Active => "active",
            OperationState::Completed => "completed",
            OperationState::Cancelled => "cancelled",
            OperationState::Failed(_) => "failed",
        }
    }

    fn can_transition_to(&self, next: &OperationState) -> bool {
        use OperationState::*;

        matches!(
            (self, next),
            (Created, ResolvingContainer)
                | (ResolvingContainer, Active)
                | (ResolvingContainer, Completed)
                | (ResolvingContainer, Failed(_))
                | (Active, Completed)
                | (Active, Cancelled)
                | (Active, Failed(_))
        )
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Operation Entity
// ============================================================================

/// One gather, upload, download, delete or move request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOperation {
    pub id: SyncOperationId,
    pub kind: OperationKind,
    pub container_id: String,
    /// Empty for one-shot operations
    pub channel_name: String,
    pub state: OperationState,
}

impl SyncOperation {
    pub fn new(
        kind: OperationKind,
        container_id: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            id: SyncOperationId::new(),
            kind,
            container_id: container_id.into(),
            channel_name: channel_name.into(),
            state: OperationState::Created,
        }
    }

    pub fn resolve(&mut self) -> Result<()> {
        self.transition(OperationState::ResolvingContainer)
    }

    pub fn activate(&mut self) -> Result<()> {
        self.transition(OperationState::Active)
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(OperationState::Completed)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition(OperationState::Cancelled)
    }

    pub fn fail(&mut self, kind: ErrorKind) -> Result<()> {
        self.transition(OperationState::Failed(kind.into()))
    }

    fn transition(&mut self, next: OperationState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(DocumentError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}
