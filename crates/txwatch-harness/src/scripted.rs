//! Deterministic in-memory resource with fault injection.
//!
//! [`ScriptedResource`] implements [`TransactionalResource`] over a simple
//! model (open transaction flag, savepoint stack, call log) and fails
//! operations according to declarative [`FaultSpec`] rules. Same specs, same
//! failures.
//!
//! ```ignore
//! let resource = ScriptedResource::new();
//! resource.inject_fault(FaultSpec::on(Op::Commit).after_count(1));
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use txwatch_core::{ResourceFactory, TransactionalResource};

// ---------------------------------------------------------------------------
// Operations and errors
// ---------------------------------------------------------------------------

/// Operation of the scripted resource (or factory) that a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    Execute,
    Prepare,
    ExecutePrepared,
    ExecuteBatch,
    Commit,
    Rollback,
    RollbackTo,
    Savepoint,
    ReleaseSavepoint,
    Close,
}

impl Op {
    /// Stable label used in errors and call logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Execute => "execute",
            Self::Prepare => "prepare",
            Self::ExecutePrepared => "execute_prepared",
            Self::ExecuteBatch => "execute_batch",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::RollbackTo => "rollback_to",
            Self::Savepoint => "savepoint",
            Self::ReleaseSavepoint => "release_savepoint",
            Self::Close => "close",
        }
    }
}

/// Errors raised by the scripted resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptedError {
    #[error("injected {} fault", .op.label())]
    Injected { op: Op },

    #[error("resource is closed")]
    Closed,

    #[error("no such savepoint: #{0}")]
    NoSuchSavepoint(u64),
}

// ---------------------------------------------------------------------------
// Fault specification
// ---------------------------------------------------------------------------

/// Declarative fault rule targeting one operation.
#[derive(Debug, Clone)]
pub struct FaultSpec {
    op: Op,
    /// Matching calls let through before the first failure.
    after_count: u64,
    max_triggers: u32,
    match_count: u64,
    trigger_count: u32,
}

impl FaultSpec {
    /// Fail the next call of `op`, once.
    #[must_use]
    pub const fn on(op: Op) -> Self {
        Self {
            op,
            after_count: 0,
            max_triggers: 1,
            match_count: 0,
            trigger_count: 0,
        }
    }

    /// Let `n` matching calls succeed first.
    #[must_use]
    pub const fn after_count(mut self, n: u64) -> Self {
        self.after_count = n;
        self
    }

    /// Fail up to `n` times.
    #[must_use]
    pub const fn times(mut self, n: u32) -> Self {
        self.max_triggers = n;
        self
    }

    fn check(&mut self, op: Op) -> bool {
        if op != self.op || self.trigger_count >= self.max_triggers {
            return false;
        }
        self.match_count += 1;
        if self.match_count <= self.after_count {
            return false;
        }
        self.trigger_count += 1;
        true
    }
}

#[derive(Debug, Default)]
struct FaultPlan {
    specs: Vec<FaultSpec>,
    triggered: Vec<Op>,
}

impl FaultPlan {
    fn check(&mut self, op: Op) -> Result<(), ScriptedError> {
        let fired = self.specs.iter_mut().any(|spec| spec.check(op));
        if fired {
            tracing::debug!(op = op.label(), "fault injected");
            self.triggered.push(op);
            Err(ScriptedError::Injected { op })
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedResource
// ---------------------------------------------------------------------------

/// Prepared statement handle of [`ScriptedResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedPrepared {
    pub sql: String,
}

/// Savepoint handle of [`ScriptedResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedSavepoint {
    pub id: u64,
    pub name: Option<String>,
}

#[derive(Debug, Default)]
struct Model {
    in_transaction: bool,
    savepoints: Vec<u64>,
    next_savepoint: u64,
    closed: bool,
    calls: Vec<String>,
    executed: usize,
}

/// In-memory transactional resource with scripted failures.
#[derive(Debug, Default)]
pub struct ScriptedResource {
    model: Mutex<Model>,
    faults: Mutex<FaultPlan>,
}

impl ScriptedResource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fault rule.
    pub fn inject_fault(&self, spec: FaultSpec) {
        self.faults.lock().specs.push(spec);
    }

    /// Fail the next call of `op`.
    pub fn fail_next(&self, op: Op) {
        self.inject_fault(FaultSpec::on(op));
    }

    /// Operations that failed by injection, in order.
    #[must_use]
    pub fn triggered(&self) -> Vec<Op> {
        self.faults.lock().triggered.clone()
    }

    /// Every successful call, rendered as `label` or `label:detail`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.model.lock().calls.clone()
    }

    /// Number of statements executed (ad-hoc, prepared, or batched).
    #[must_use]
    pub fn executed(&self) -> usize {
        self.model.lock().executed
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.model.lock().in_transaction
    }

    /// Savepoint ids currently open, oldest first.
    #[must_use]
    pub fn open_savepoints(&self) -> Vec<u64> {
        self.model.lock().savepoints.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.model.lock().closed
    }

    fn call<T>(
        &self,
        op: Op,
        detail: &str,
        f: impl FnOnce(&mut Model) -> Result<T, ScriptedError>,
    ) -> Result<T, ScriptedError> {
        let mut model = self.model.lock();
        if model.closed {
            return Err(ScriptedError::Closed);
        }
        self.faults.lock().check(op)?;
        let out = f(&mut model)?;
        if detail.is_empty() {
            model.calls.push(op.label().to_owned());
        } else {
            model.calls.push(format!("{}:{detail}", op.label()));
        }
        drop(model);
        Ok(out)
    }

    fn position(model: &Model, savepoint: &ScriptedSavepoint) -> Result<usize, ScriptedError> {
        model
            .savepoints
            .iter()
            .rposition(|id| *id == savepoint.id)
            .ok_or(ScriptedError::NoSuchSavepoint(savepoint.id))
    }
}

impl TransactionalResource for ScriptedResource {
    type Error = ScriptedError;
    type Output = usize;
    type Prepared = ScriptedPrepared;
    type Savepoint = ScriptedSavepoint;

    fn execute(&self, sql: &str) -> Result<usize, ScriptedError> {
        self.call(Op::Execute, sql, |m| {
            m.in_transaction = true;
            m.executed += 1;
            Ok(1)
        })
    }

    fn prepare(&self, sql: &str) -> Result<ScriptedPrepared, ScriptedError> {
        self.call(Op::Prepare, sql, |_| {
            Ok(ScriptedPrepared {
                sql: sql.to_owned(),
            })
        })
    }

    fn execute_prepared(&self, prepared: &ScriptedPrepared) -> Result<usize, ScriptedError> {
        self.call(Op::ExecutePrepared, &prepared.sql, |m| {
            m.in_transaction = true;
            m.executed += 1;
            Ok(1)
        })
    }

    fn execute_batch(&self, batch: &[String]) -> Result<Vec<usize>, ScriptedError> {
        self.call(Op::ExecuteBatch, &batch.len().to_string(), |m| {
            m.in_transaction |= !batch.is_empty();
            m.executed += batch.len();
            Ok(vec![1; batch.len()])
        })
    }

    fn commit(&self) -> Result<(), ScriptedError> {
        self.call(Op::Commit, "", |m| {
            m.in_transaction = false;
            m.savepoints.clear();
            Ok(())
        })
    }

    fn rollback(&self) -> Result<(), ScriptedError> {
        self.call(Op::Rollback, "", |m| {
            m.in_transaction = false;
            m.savepoints.clear();
            Ok(())
        })
    }

    fn rollback_to(&self, savepoint: &ScriptedSavepoint) -> Result<(), ScriptedError> {
        self.call(Op::RollbackTo, &savepoint.id.to_string(), |m| {
            let idx = Self::position(m, savepoint)?;
            // The savepoint itself survives a rollback to it.
            m.savepoints.truncate(idx + 1);
            Ok(())
        })
    }

    fn savepoint(&self, name: Option<&str>) -> Result<ScriptedSavepoint, ScriptedError> {
        self.call(Op::Savepoint, name.unwrap_or(""), |m| {
            m.next_savepoint += 1;
            m.savepoints.push(m.next_savepoint);
            m.in_transaction = true;
            Ok(ScriptedSavepoint {
                id: m.next_savepoint,
                name: name.map(str::to_owned),
            })
        })
    }

    fn release_savepoint(&self, savepoint: &ScriptedSavepoint) -> Result<(), ScriptedError> {
        self.call(Op::ReleaseSavepoint, &savepoint.id.to_string(), |m| {
            let idx = Self::position(m, savepoint)?;
            m.savepoints.truncate(idx);
            Ok(())
        })
    }

    fn close(&self) -> Result<(), ScriptedError> {
        self.call(Op::Close, "", |m| {
            m.closed = true;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedFactory
// ---------------------------------------------------------------------------

/// Factory producing fresh [`ScriptedResource`]s.
///
/// Faults injected here apply to `open`; per-resource faults are injected on
/// the resource itself.
#[derive(Debug, Default, Clone)]
pub struct ScriptedFactory {
    faults: Arc<Mutex<FaultPlan>>,
    opened: Arc<Mutex<usize>>,
}

impl ScriptedFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `open`.
    pub fn fail_next_open(&self) {
        self.faults.lock().specs.push(FaultSpec::on(Op::Open));
    }

    /// Resources opened successfully so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        *self.opened.lock()
    }
}

impl ResourceFactory for ScriptedFactory {
    type Resource = ScriptedResource;

    fn open(&self) -> Result<ScriptedResource, ScriptedError> {
        self.faults.lock().check(Op::Open)?;
        *self.opened.lock() += 1;
        Ok(ScriptedResource::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_fires_once_by_default() {
        let r = ScriptedResource::new();
        r.fail_next(Op::Commit);
        assert_eq!(r.commit(), Err(ScriptedError::Injected { op: Op::Commit }));
        assert_eq!(r.commit(), Ok(()));
        assert_eq!(r.triggered(), [Op::Commit]);
    }

    #[test]
    fn after_count_and_times() {
        let r = ScriptedResource::new();
        r.inject_fault(FaultSpec::on(Op::Execute).after_count(2).times(2));
        assert!(r.execute("a").is_ok());
        assert!(r.execute("b").is_ok());
        assert!(r.execute("c").is_err());
        assert!(r.execute("d").is_err());
        assert!(r.execute("e").is_ok());
        assert_eq!(r.executed(), 3);
    }

    #[test]
    fn savepoint_model() {
        let r = ScriptedResource::new();
        let a = r.savepoint(Some("a")).unwrap();
        let b = r.savepoint(None).unwrap();
        r.savepoint(None).unwrap();
        r.rollback_to(&b).unwrap();
        assert_eq!(r.open_savepoints(), [a.id, b.id]);
        r.release_savepoint(&a).unwrap();
        assert!(r.open_savepoints().is_empty());
        assert_eq!(
            r.release_savepoint(&b),
            Err(ScriptedError::NoSuchSavepoint(b.id))
        );
    }

    #[test]
    fn closed_resource_refuses_everything() {
        let r = ScriptedResource::new();
        r.close().unwrap();
        assert_eq!(r.execute("x"), Err(ScriptedError::Closed));
        assert!(r.is_closed());
    }

    #[test]
    fn failed_calls_are_not_logged() {
        let r = ScriptedResource::new();
        r.fail_next(Op::Execute);
        let _ = r.execute("lost");
        r.execute("kept").unwrap();
        assert_eq!(r.calls(), ["execute:kept"]);
    }

    #[test]
    fn factory_open_faults() {
        let f = ScriptedFactory::new();
        f.fail_next_open();
        assert_eq!(
            f.open().unwrap_err(),
            ScriptedError::Injected { op: Op::Open }
        );
        assert!(f.open().is_ok());
        assert_eq!(f.opened(), 1);
    }

    #[test]
    fn error_display() {
        let injected = ScriptedError::Injected { op: Op::RollbackTo };
        let missing = ScriptedError::NoSuchSavepoint(3);
        assert_eq!(injected.to_string(), "injected rollback_to fault");
        assert_eq!(missing.to_string(), "no such savepoint: #3");
    }
}
