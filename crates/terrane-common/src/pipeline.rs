//! Ordered step pipeline with fatal and advisory steps.
//!
//! A lifecycle operation is a linear sequence of steps. Fatal steps abort the
//! operation on error; advisory steps log a warning and let it continue. The
//! pipeline records what happened so the operation's outcome is derived from
//! the steps rather than tracked by hand.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use tracing::{info, warn};

use crate::poll::PollOutcome;
use crate::Result;

/// Whether a step failure ends the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Fatal,
    Advisory,
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    /// Advisory step that failed or timed out
    Degraded(String),
    Failed(String),
    Skipped(String),
    /// Failed, then handled by a recovery path later in the pipeline
    Recovered(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
}

/// Kind of lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Apply,
    Destroy,
    Backup,
    Restore,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Apply => "apply",
            OperationKind::Destroy => "destroy",
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
        };
        f.write_str(s)
    }
}

/// How the operation was invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Interactive,
    AutoApproved,
    PlanOnly,
}

impl OperationMode {
    pub fn from_flags(auto_approve: bool, plan_only: bool) -> Self {
        if plan_only {
            OperationMode::PlanOnly
        } else if auto_approve {
            OperationMode::AutoApproved
        } else {
            OperationMode::Interactive
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationMode::Interactive => "interactive",
            OperationMode::AutoApproved => "auto-approved",
            OperationMode::PlanOnly => "plan-only",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Completed, but at least one advisory step did not
    Partial,
    Failed,
    /// The operator declined the confirmation gate
    Aborted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
            Outcome::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One invocation of a lifecycle operation; lives only as long as the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOperation {
    pub kind: OperationKind,
    pub mode: OperationMode,
    pub outcome: Outcome,
    pub steps: Vec<StepRecord>,
}

/// Executes steps in order and records their status
#[derive(Debug)]
pub struct Pipeline {
    kind: OperationKind,
    mode: OperationMode,
    steps: Vec<StepRecord>,
    aborted: bool,
    started: Instant,
}

impl Pipeline {
    pub fn new(kind: OperationKind, mode: OperationMode) -> Self {
        info!(operation = %kind, mode = %mode, "Starting operation");
        Self {
            kind,
            mode,
            steps: Vec::new(),
            aborted: false,
            started: Instant::now(),
        }
    }

    /// Run a step whose failure ends the operation.
    pub async fn fatal<T, Fut>(&mut self, name: &str, step: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        info!(operation = %self.kind, step = name, "Running step");
        match step.await {
            Ok(value) => {
                self.record(name, StepKind::Fatal, StepStatus::Succeeded);
                Ok(value)
            }
            Err(e) => {
                self.record(name, StepKind::Fatal, StepStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Run a step whose failure is logged and tolerated.
    pub async fn advisory<T, Fut>(&mut self, name: &str, step: Fut) -> Option<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        info!(operation = %self.kind, step = name, "Running step");
        match step.await {
            Ok(value) => {
                self.record(name, StepKind::Advisory, StepStatus::Succeeded);
                Some(value)
            }
            Err(e) => {
                warn!(operation = %self.kind, step = name, error = %e, "Advisory step failed, continuing");
                self.degrade(name, e.to_string());
                None
            }
        }
    }

    /// Record an advisory step that completed without reaching its goal
    /// (e.g. a readiness poll that timed out).
    pub fn degrade(&mut self, name: &str, reason: impl Into<String>) {
        self.record(name, StepKind::Advisory, StepStatus::Degraded(reason.into()));
    }

    pub fn succeed(&mut self, name: &str, kind: StepKind) {
        self.record(name, kind, StepStatus::Succeeded);
    }

    pub fn recovered(&mut self, name: &str, reason: impl Into<String>) {
        self.record(name, StepKind::Fatal, StepStatus::Recovered(reason.into()));
    }

    /// Record a readiness poll as an advisory step; timeouts and check
    /// failures degrade the operation instead of failing it.
    pub fn record_poll<T>(&mut self, name: &str, outcome: PollOutcome<T>) -> Option<T> {
        match outcome {
            PollOutcome::Ready(value) => {
                self.succeed(name, StepKind::Advisory);
                Some(value)
            }
            PollOutcome::TimedOut { attempts } => {
                warn!(operation = %self.kind, step = name, attempts, "Timed out waiting, continuing");
                self.degrade(name, format!("not ready after {} attempts", attempts));
                None
            }
            PollOutcome::Failed(message) => {
                warn!(operation = %self.kind, step = name, error = %message, "Check failed, continuing");
                self.degrade(name, message);
                None
            }
        }
    }

    pub fn skip(&mut self, name: &str, reason: impl Into<String>) {
        self.record(name, StepKind::Advisory, StepStatus::Skipped(reason.into()));
    }

    /// Mark the operation as declined by the operator.
    pub fn abort(&mut self, name: &str) {
        self.aborted = true;
        self.record(name, StepKind::Fatal, StepStatus::Skipped("declined".to_string()));
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Derive the outcome from the recorded steps.
    pub fn outcome(&self) -> Outcome {
        if self.aborted {
            return Outcome::Aborted;
        }
        if self
            .steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed(_)))
        {
            return Outcome::Failed;
        }
        if self
            .steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Degraded(_)))
        {
            return Outcome::Partial;
        }
        Outcome::Success
    }

    /// Close the pipeline and produce the operation record.
    pub fn finish(self) -> LifecycleOperation {
        let outcome = self.outcome();
        info!(
            operation = %self.kind,
            outcome = %outcome,
            elapsed = ?self.started.elapsed(),
            "Operation finished"
        );
        LifecycleOperation {
            kind: self.kind,
            mode: self.mode,
            outcome,
            steps: self.steps,
        }
    }

    fn record(&mut self, name: &str, kind: StepKind, status: StepStatus) {
        self.steps.push(StepRecord {
            name: name.to_string(),
            kind,
            status,
        });
    }
}
