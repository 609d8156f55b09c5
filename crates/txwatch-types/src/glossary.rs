//! Glossary types.
//!
//! Identities and lifecycle states shared by every txwatch layer: scope
//! identity, savepoint markers, connection identity, and the completion
//! states a tracked transaction moves through.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Process-unique identity of one tracked transaction or savepoint scope.
///
/// Rendered as a hyphenated v4 UUID, which is the transaction id handed to
/// listeners.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Opaque identity distinguishing one savepoint scope from another.
///
/// Markers are compared for equality only and carry no ordering meaning.
/// [`SavepointMarker::Root`] denotes the outermost, implicitly begun
/// transaction; it is also the target of a full commit or rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SavepointMarker {
    /// The outermost transaction.
    Root,
    /// An explicitly created savepoint.
    Savepoint(NonZeroU64),
}

static NEXT_SAVEPOINT: AtomicU64 = AtomicU64::new(1);

impl SavepointMarker {
    /// Allocate a marker that no other savepoint in this process carries.
    #[must_use]
    pub fn fresh() -> Self {
        let raw = NEXT_SAVEPOINT.fetch_add(1, Ordering::Relaxed);
        // Counter starts at 1 and would need 2^64 allocations to wrap.
        NonZeroU64::new(raw).map_or(Self::Root, Self::Savepoint)
    }

    /// Whether this is the root marker.
    #[inline]
    pub const fn is_root(self) -> bool {
        matches!(self, Self::Root)
    }
}

impl fmt::Display for SavepointMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Savepoint(n) => write!(f, "sp#{n}"),
        }
    }
}

/// Identity of one monitored connection within a resource registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ConnectionId(NonZeroU64);

impl ConnectionId {
    /// Construct a `ConnectionId`; zero is not a valid id.
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Wrap a value already known to be non-zero.
    #[inline]
    pub const fn from_nonzero(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.get())
    }
}

/// How a finished scope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Outcome {
    Commit,
    Rollback,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => f.write_str("commit"),
            Self::Rollback => f.write_str("rollback"),
        }
    }
}

/// Completion state of a tracked scope.
///
/// Transitions `Running -> Committed` or `Running -> RolledBack` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ScopeState {
    Running,
    Committed,
    RolledBack,
}

impl ScopeState {
    /// Whether the scope has finished.
    #[inline]
    pub const fn is_complete(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl From<Outcome> for ScopeState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Commit => Self::Committed,
            Outcome::Rollback => Self::RolledBack,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn scope_ids_are_unique() {
        let ids: HashSet<ScopeId> = (0..1_000).map(|_| ScopeId::random()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn scope_id_renders_hyphenated_uuid() {
        let id = ScopeId::random();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.matches('-').count(), 4);
        assert_eq!(text, id.as_uuid().to_string());
    }

    #[test]
    fn fresh_markers_never_repeat_and_never_root() {
        let a = SavepointMarker::fresh();
        let b = SavepointMarker::fresh();
        assert_ne!(a, b);
        assert!(!a.is_root());
        assert!(!b.is_root());
        assert_eq!(SavepointMarker::Root, SavepointMarker::Root);
    }

    #[test]
    fn marker_display() {
        assert_eq!(SavepointMarker::Root.to_string(), "root");
        let marker = SavepointMarker::Savepoint(NonZeroU64::new(7).unwrap());
        assert_eq!(marker.to_string(), "sp#7");
    }

    #[test]
    fn connection_id_rejects_zero() {
        assert!(ConnectionId::new(0).is_none());
        assert_eq!(ConnectionId::new(3).unwrap().get(), 3);
        assert_eq!(ConnectionId::new(3).unwrap().to_string(), "conn#3");
    }

    #[test]
    fn scope_state_from_outcome() {
        assert_eq!(ScopeState::from(Outcome::Commit), ScopeState::Committed);
        assert_eq!(ScopeState::from(Outcome::Rollback), ScopeState::RolledBack);
        assert!(!ScopeState::Running.is_complete());
        assert!(ScopeState::Committed.is_complete());
        assert!(ScopeState::RolledBack.is_complete());
    }

    #[test]
    fn scope_id_serializes_as_string() {
        let id = ScopeId::random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
