//! statelane: a thread-safe reducer store
//!
//! State is replaced by folding actions through reducers. Middleware and
//! listeners fan out concurrently around each fold, and asynchronously
//! dispatched actions are serialized through a single worker lane.
//!
//! # Example
//! ```
//! use statelane::prelude::*;
//!
//! #[derive(Action, Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//!     AddBy(i64),
//! }
//!
//! let store = Store::new(0i64);
//! store.add_reducer(pure(|count: i64, action: &CounterAction| match action {
//!     CounterAction::Increment => count + 1,
//!     CounterAction::AddBy(n) => count + n,
//! }));
//! store.add_listener(watch(|count: &i64| println!("count is now {count}")));
//!
//! store.dispatch_sync(CounterAction::AddBy(41)).unwrap();
//! store.dispatch_sync(CounterAction::Increment).unwrap();
//! assert_eq!(*store.state(), 42);
//! ```

// Re-export everything from core
pub use statelane_core::*;

// Re-export derive macros
pub use statelane_macros::Action;

/// Prelude for convenient imports
pub mod prelude {
    // Traits and helpers
    pub use statelane_core::prelude::*;

    // Diagnostics
    pub use statelane_core::{CycleProfile, ProfileSink, TracingFaultSink};

    // Derive macros
    pub use statelane_macros::Action;
}
