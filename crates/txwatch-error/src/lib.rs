use thiserror::Error;

/// Primary error type for txwatch operations.
///
/// Errors raised by the wrapped resource never pass through this type: they
/// are returned to the caller unchanged. `WatchError` only covers conditions
/// that originate in the monitoring layer itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    // === Misuse Errors ===
    /// A completion trace was requested for a transaction that is still running.
    #[error("completion trace unavailable: transaction {transaction_id} has not completed")]
    TraceUnavailable { transaction_id: String },

    // === Listener Errors ===
    /// A listener returned an error from one of its hooks.
    #[error("listener {listener} failed in {hook}: {detail}")]
    ListenerFailed {
        listener: String,
        hook: &'static str,
        detail: String,
    },

    /// A listener panicked inside one of its hooks.
    #[error("listener {listener} panicked in {hook}: {detail}")]
    ListenerPanicked {
        listener: String,
        hook: &'static str,
        detail: String,
    },
}

/// Coarse classification of a [`WatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The caller asked for something that does not exist yet.
    Misuse,
    /// A listener misbehaved; the transaction path was not affected.
    Listener,
}

impl WatchError {
    /// Classify this error.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::TraceUnavailable { .. } => ErrorClass::Misuse,
            Self::ListenerFailed { .. } | Self::ListenerPanicked { .. } => ErrorClass::Listener,
        }
    }

    /// Whether the caller requested a value before it was available.
    pub const fn is_misuse(&self) -> bool {
        matches!(self.class(), ErrorClass::Misuse)
    }

    /// Whether this error reports a failing listener.
    pub const fn is_listener_failure(&self) -> bool {
        matches!(self.class(), ErrorClass::Listener)
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::TraceUnavailable { .. } => {
                "Read the completion trace from a COMMIT or ROLLBACK event"
            }
            Self::ListenerFailed { .. } | Self::ListenerPanicked { .. } => {
                "Listeners should handle their own errors; other listeners were still notified"
            }
        }
    }

    /// Create a trace-unavailable error for the given transaction.
    pub fn trace_unavailable(transaction_id: impl Into<String>) -> Self {
        Self::TraceUnavailable {
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a listener-failed error.
    pub fn listener_failed(
        listener: impl Into<String>,
        hook: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::ListenerFailed {
            listener: listener.into(),
            hook,
            detail: detail.into(),
        }
    }

    /// Create a listener-panicked error.
    pub fn listener_panicked(
        listener: impl Into<String>,
        hook: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::ListenerPanicked {
            listener: listener.into(),
            hook,
            detail: detail.into(),
        }
    }
}

/// Result type alias using `WatchError`.
pub type Result<T> = std::result::Result<T, WatchError>;
