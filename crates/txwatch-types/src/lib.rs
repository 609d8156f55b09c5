//! Leaf value types shared across txwatch crates.

pub mod call_site;
pub mod glossary;

pub use call_site::{CallSite, TraceCapture};
pub use glossary::{ConnectionId, Outcome, SavepointMarker, ScopeId, ScopeState};
