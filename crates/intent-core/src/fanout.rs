//! Partial-failure policy for handlers that touch many independent targets.
//!
//! Each sub-operation runs on its own; a failure is logged, sanitized and recorded,
//! and the batch carries on. The report lets the handler state honest counts.

use crate::response::ExecutionStatus;
use crate::sanitize::sanitize_message;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanoutFailure {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanoutReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FanoutFailure>,
}

impl FanoutReport {
    /// `Failed` only when there was work and none of it succeeded.
    pub fn status(&self) -> ExecutionStatus {
        if self.total > 0 && self.succeeded == 0 {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        }
    }

    pub fn is_partial(&self) -> bool {
        self.succeeded > 0 && self.skipped > 0
    }

    pub fn summary(&self, noun: &str) -> String {
        if self.skipped == 0 {
            format!("{} of {} {} succeeded", self.succeeded, self.total, noun)
        } else {
            format!(
                "{} of {} {} succeeded, {} skipped after errors",
                self.succeeded, self.total, noun, self.skipped
            )
        }
    }
}

/// Runs `op` for every target in order. Errors never abort the batch.
pub async fn fan_out<T, E, F, Fut>(label: &str, targets: Vec<T>, mut op: F) -> FanoutReport
where
    T: Display,
    E: Display,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut report = FanoutReport {
        total: targets.len(),
        ..Default::default()
    };
    for target in targets {
        let name = target.to_string();
        match op(target).await {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                let reason = sanitize_message(&err.to_string());
                tracing::warn!(
                    target: "intent::fanout",
                    operation = label,
                    target_id = %name,
                    reason = %reason,
                    "sub-operation failed; skipping"
                );
                report.skipped += 1;
                report.failures.push(FanoutFailure { target: name, reason });
            }
        }
    }
    if report.skipped > 0 {
        tracing::info!(
            target: "intent::fanout",
            operation = label,
            total = report.total,
            succeeded = report.succeeded,
            skipped = report.skipped,
            "fan-out finished with failures"
        );
    }
    report
}
