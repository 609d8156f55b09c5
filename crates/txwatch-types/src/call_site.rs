//! Call-site capture for transaction diagnostics.
//!
//! A [`CallSite`] records where a scope began or completed. The cheap form is
//! the source location of the outermost `#[track_caller]` frame (the
//! application's call into the monitored connection). [`TraceCapture::Backtrace`]
//! additionally captures a full stack trace.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// How much context to capture for each call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceCapture {
    /// Source location and thread name only.
    #[default]
    Location,
    /// Source location, thread name, and a forced stack backtrace.
    Backtrace,
}

/// Captured calling context.
///
/// Cloning is cheap: the backtrace, when present, is shared immutably.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CallSite {
    file: &'static str,
    line: u32,
    column: u32,
    thread: Option<String>,
    #[serde(skip)]
    backtrace: Option<Arc<Backtrace>>,
}

impl CallSite {
    /// Capture the caller's location (and backtrace if requested).
    #[track_caller]
    #[must_use]
    pub fn capture(mode: TraceCapture) -> Self {
        let location = Location::caller();
        let backtrace = match mode {
            TraceCapture::Location => None,
            TraceCapture::Backtrace => Some(Arc::new(Backtrace::force_capture())),
        };
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
            thread: std::thread::current().name().map(str::to_owned),
            backtrace,
        }
    }

    /// Source file of the call.
    pub const fn file(&self) -> &'static str {
        self.file
    }

    /// Line of the call.
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// Column of the call.
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Name of the calling thread, if it had one.
    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    /// Captured backtrace, if one was requested and the platform supports it.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace
            .as_deref()
            .filter(|bt| bt.status() == BacktraceStatus::Captured)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)?;
        if let Some(thread) = &self.thread {
            write!(f, " ({thread})")?;
        }
        Ok(())
    }
}
