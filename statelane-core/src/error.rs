//! Error types returned to callers of the store

use thiserror::Error;

/// Error produced by a reducer that cannot handle an action.
///
/// Returning this from [`Reducer::reduce`](crate::Reducer::reduce) aborts the
/// whole fold for the current cycle; the store keeps its pre-cycle state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ReduceError(String);

impl ReduceError {
    /// Create a reduce error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Returned by `dispatch*` when the action was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The store was stopped; no reduction cycle will run for this action.
    #[error("store has been stopped")]
    Stopped,
}

/// Returned by worker lane lifecycle calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LaneError {
    /// The lane was stopped and cannot be restarted.
    #[error("worker lane has been stopped and cannot be restarted")]
    Stopped,
    /// `start()` was called outside of a tokio runtime.
    #[error("no tokio runtime available to run the worker lane")]
    NoRuntime,
}

/// Invalid store configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    /// The dedicated hook pool could not be created.
    #[error("failed to build hook thread pool: {0}")]
    HookPool(#[from] rayon::ThreadPoolBuildError),
}
