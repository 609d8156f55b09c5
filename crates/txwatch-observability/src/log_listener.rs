//! Built-in listener that logs completed transactions through `tracing`.

use std::time::Duration;

use crate::{ListenerResult, TransactionEvent, TransactionListener};

/// Logs every statement of a completed scope, then one summary line with the
/// scope's cost.
///
/// Completions slower than the configured threshold are logged at `WARN`
/// instead of `INFO`.
#[derive(Debug, Clone)]
pub struct LogListener {
    slow_threshold: Option<Duration>,
    log_statements: bool,
}

impl LogListener {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slow_threshold: None,
            log_statements: true,
        }
    }

    /// Escalate completions taking at least `threshold` to `WARN`.
    #[must_use]
    pub const fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Toggle the per-statement lines.
    #[must_use]
    pub const fn with_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Whether `event` crossed the slow threshold.
    #[must_use]
    pub fn is_slow(&self, event: &TransactionEvent) -> bool {
        self.slow_threshold
            .is_some_and(|threshold| event.elapsed() >= threshold)
    }

    fn log_completion(&self, event: &TransactionEvent, outcome: &'static str) {
        let txn = event.transaction_id();
        if self.log_statements {
            for sql in event.statements() {
                tracing::info!(target: "txwatch", txn = %txn, sql = %sql, "transaction statement");
            }
        }
        let cost_ms = event.elapsed_ms();
        let statements = event.statements().len();
        if self.is_slow(event) {
            let completed_at = event
                .end_trace()
                .map_or_else(|_| "unknown".to_owned(), ToString::to_string);
            tracing::warn!(
                target: "txwatch",
                txn = %txn,
                marker = %event.marker(),
                outcome,
                cost_ms,
                statements,
                completed_at = %completed_at,
                "slow transaction"
            );
        } else {
            tracing::info!(
                target: "txwatch",
                txn = %txn,
                marker = %event.marker(),
                outcome,
                cost_ms,
                statements,
                "transaction completed"
            );
        }
    }
}

impl Default for LogListener {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionListener for LogListener {
    fn on_begin(&self, event: &TransactionEvent) -> ListenerResult {
        tracing::debug!(
            target: "txwatch",
            txn = %event.transaction_id(),
            marker = %event.marker(),
            origin = %event.start_trace(),
            "transaction begun"
        );
        Ok(())
    }

    fn on_commit(&self, event: &TransactionEvent) -> ListenerResult {
        self.log_completion(event, "commit");
        Ok(())
    }

    fn on_rollback(&self, event: &TransactionEvent) -> ListenerResult {
        self.log_completion(event, "rollback");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
