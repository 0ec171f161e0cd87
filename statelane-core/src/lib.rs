//! Core traits and types for statelane
//!
//! This crate provides a centralized, thread-safe state container following a
//! Redux-inspired architecture. State is replaced, never mutated, by folding
//! an action through reducers.
//!
//! # Core Concepts
//!
//! - **Action**: A named intent to change state
//! - **Reducer**: Pure `(state, action) -> state` step; reducers fold in order
//! - **Middleware**: Observes each action before reduction and after notification
//! - **StateListener**: Decides whether a change matters, then reacts to it
//! - **Store**: Owns the state, the hook registries, and the worker lane
//!
//! # The reduction cycle
//!
//! Every dispatched action runs one cycle with four phases:
//!
//! 1. **before**: all middleware `before` hooks, concurrently
//! 2. **reduce**: reducers folded sequentially, then the new state is published
//! 3. **notify**: every listener's `has_changed`/`on_changed`, concurrently
//! 4. **after**: all middleware `after` hooks, concurrently, on the new state
//!
//! Each phase finishes before the next starts. A failing reducer aborts the
//! fold: the state is unchanged and notify/after are skipped. Panics in any
//! hook are caught and reported to a [`FaultSink`].
//!
//! # Basic Example
//!
//! ```
//! use statelane_core::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//!     Decrement,
//! }
//!
//! impl Action for CounterAction {
//!     fn name(&self) -> &str {
//!         match self {
//!             CounterAction::Increment => "Increment",
//!             CounterAction::Decrement => "Decrement",
//!         }
//!     }
//! }
//!
//! let store = Store::new(0i64);
//! store.add_reducer(pure(|count: i64, action: &CounterAction| match action {
//!     CounterAction::Increment => count + 1,
//!     CounterAction::Decrement => count - 1,
//! }));
//!
//! store.dispatch_sync(CounterAction::Increment).unwrap();
//! assert_eq!(*store.state(), 1);
//! ```
//!
//! # Asynchronous dispatch
//!
//! [`Store::dispatch`] queues the action on a single worker lane and returns
//! immediately. The lane runs inside a tokio runtime and processes actions
//! strictly in the order they were accepted:
//!
//! ```ignore
//! store.start()?;
//! for _ in 0..10 {
//!     store.dispatch(CounterAction::Increment)?;
//! }
//! store.idle().await;
//! store.stop();
//! store.join().await;
//! ```

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod fault;
pub mod listener;
pub mod middleware;
pub mod profile;
pub mod reducer;
pub mod registry;
pub mod store;
pub mod testing;
pub mod worker;

// Core trait exports
pub use action::{Action, JsonAction, NamedAction};
pub use listener::{listener, select, watch, FnListener, Select, StateListener, Watch};
pub use middleware::{
    ActionFilter, ComposedMiddleware, LoggingMiddleware, Middleware, NoopMiddleware,
};
pub use reducer::{pure, Pure, Reducer};

// Store exports
pub use config::{StopPolicy, StoreConfig};
pub use engine::{CycleOutcome, CycleReport, ReductionEngine};
pub use registry::{HookId, Registry, Snapshot};
pub use store::{DispatchMode, Store, StoreBuilder};
pub use worker::{Dispatcher, LaneHandler, LaneState};

// Diagnostics exports
pub use error::{ConfigError, DispatchError, LaneError, ReduceError};
pub use fault::{Fault, FaultSink, Phase, TracingFaultSink};
pub use profile::{CycleProfile, ProfileSink};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{Action, JsonAction, NamedAction};
    pub use crate::config::{StopPolicy, StoreConfig};
    pub use crate::error::{DispatchError, ReduceError};
    pub use crate::fault::{Fault, FaultSink};
    pub use crate::listener::{listener, select, watch, StateListener};
    pub use crate::middleware::{
        ActionFilter, ComposedMiddleware, LoggingMiddleware, Middleware, NoopMiddleware,
    };
    pub use crate::reducer::{pure, Reducer};
    pub use crate::store::{DispatchMode, Store};
}
