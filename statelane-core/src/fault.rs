//! Collaborator faults and where they are reported
//!
//! Nothing that goes wrong inside a reduction cycle is returned to the caller
//! of `dispatch`. Instead each fault is isolated at the call that raised it and
//! handed to a [`FaultSink`]. The default sink writes through `tracing`.

use std::any::Any;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The phases of one reduction cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    Reduce,
    Notify,
    After,
}

impl Phase {
    /// Get the phase name
    pub fn name(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::Reduce => "reduce",
            Phase::Notify => "notify",
            Phase::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failure raised by a collaborator or by the worker lane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A reducer returned an error or panicked. The fold was aborted.
    #[error("reducer #{index} failed on `{action}`: {message}")]
    Reducer {
        action: String,
        index: usize,
        message: String,
    },
    /// A middleware hook panicked.
    #[error("middleware {phase} hook panicked on `{action}`: {message}")]
    Middleware {
        action: String,
        phase: Phase,
        message: String,
    },
    /// A listener panicked while comparing or being notified.
    #[error("listener panicked after `{action}`: {message}")]
    Listener { action: String, message: String },
    /// The worker lane lost a cycle outside of any hook.
    #[error("worker lane failed while processing `{action}`: {message}")]
    Lane { action: String, message: String },
}

impl Fault {
    /// Name of the action whose cycle raised this fault.
    pub fn action(&self) -> &str {
        match self {
            Fault::Reducer { action, .. }
            | Fault::Middleware { action, .. }
            | Fault::Listener { action, .. }
            | Fault::Lane { action, .. } => action,
        }
    }

    /// The cycle phase the fault was raised in.
    ///
    /// Lane faults happen outside the four phases and have none.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Fault::Reducer { .. } => Some(Phase::Reduce),
            Fault::Middleware { phase, .. } => Some(*phase),
            Fault::Listener { .. } => Some(Phase::Notify),
            Fault::Lane { .. } => None,
        }
    }

    /// Whether the fault aborted the cycle's fold.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, Fault::Reducer { .. } | Fault::Lane { .. })
    }
}

/// Receives faults raised during reduction cycles.
///
/// Sinks are called from whichever thread raised the fault, possibly several
/// at once.
pub trait FaultSink: Send + Sync {
    fn report(&self, fault: &Fault);
}

/// Default sink: logs faults through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFaultSink;

impl FaultSink for TracingFaultSink {
    fn report(&self, fault: &Fault) {
        let phase = fault.phase().map(Phase::name);
        if fault.aborts_cycle() {
            tracing::error!(
                action = %fault.action(),
                ?phase,
                error = %fault,
                "Reduction cycle aborted"
            );
        } else {
            tracing::warn!(action = %fault.action(), ?phase, error = %fault, "Hook failed");
        }
    }
}

impl<F> FaultSink for F
where
    F: Fn(&Fault) + Send + Sync,
{
    fn report(&self, fault: &Fault) {
        self(fault)
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
