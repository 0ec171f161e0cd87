//! Test utilities for statelane stores
//!
//! - [`RecordingMiddleware`]: captures every action and the states each phase saw
//! - [`RecordingListener`]: captures every state it was notified with
//! - [`CollectingFaultSink`] and [`CollectingProfileSink`]: in-memory sinks
//! - Assertion macros for verifying recorded actions
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use statelane_core::testing::RecordingMiddleware;
//! use statelane_core::{assert_recorded, pure, Action, NamedAction, Store};
//!
//! let store: Store<i32, NamedAction<i32>> = Store::new(0);
//! store.add_reducer(pure(|s: i32, a: &NamedAction<i32>| s + a.payload()));
//! let recorder = Arc::new(RecordingMiddleware::<i32, NamedAction<i32>>::new());
//! store.middlewares().add(recorder.clone());
//!
//! store.dispatch_sync(NamedAction::new("add", 2)).unwrap();
//!
//! let actions = recorder.actions();
//! assert_recorded!(actions, a if a.name() == "add");
//! assert_eq!(recorder.after_states(), vec![2]);
//! ```

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::action::Action;
use crate::fault::{Fault, FaultSink};
use crate::listener::StateListener;
use crate::middleware::Middleware;
use crate::profile::{CycleProfile, ProfileSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Middleware that records what it observes.
///
/// Before hooks of concurrent cycles may interleave, so the recorded order
/// is only meaningful when actions are dispatched one at a time.
pub struct RecordingMiddleware<S, A> {
    actions: Mutex<Vec<A>>,
    before: Mutex<Vec<S>>,
    after: Mutex<Vec<S>>,
}

impl<S, A> RecordingMiddleware<S, A> {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            before: Mutex::new(Vec::new()),
            after: Mutex::new(Vec::new()),
        }
    }
}

impl<S, A> Default for RecordingMiddleware<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> fmt::Debug for RecordingMiddleware<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingMiddleware")
            .field("before", &lock(&self.before).len())
            .field("after", &lock(&self.after).len())
            .finish()
    }
}

impl<S: Clone, A: Clone> RecordingMiddleware<S, A> {
    /// Actions seen by the before phase, in arrival order
    pub fn actions(&self) -> Vec<A> {
        lock(&self.actions).clone()
    }

    /// States passed to `before`
    pub fn before_states(&self) -> Vec<S> {
        lock(&self.before).clone()
    }

    /// States passed to `after`
    pub fn after_states(&self) -> Vec<S> {
        lock(&self.after).clone()
    }

    pub fn before_count(&self) -> usize {
        lock(&self.before).len()
    }

    pub fn after_count(&self) -> usize {
        lock(&self.after).len()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        lock(&self.actions).clear();
        lock(&self.before).clear();
        lock(&self.after).clear();
    }
}

impl<S, A> Middleware<S, A> for RecordingMiddleware<S, A>
where
    S: Clone + Send + Sync,
    A: Action,
{
    fn before(&self, state: &S, action: &A) {
        lock(&self.actions).push(action.clone());
        lock(&self.before).push(state.clone());
    }

    fn after(&self, state: &S, _action: &A) {
        lock(&self.after).push(state.clone());
    }
}

/// Listener that records every state it was notified with.
///
/// Reports a change whenever the new state is not equal to the old one.
pub struct RecordingListener<S> {
    changes: Mutex<Vec<S>>,
}

impl<S> RecordingListener<S> {
    pub fn new() -> Self {
        Self {
            changes: Mutex::new(Vec::new()),
        }
    }
}

impl<S> Default for RecordingListener<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: fmt::Debug> fmt::Debug for RecordingListener<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingListener")
            .field("changes", &*lock(&self.changes))
            .finish()
    }
}

impl<S: Clone> RecordingListener<S> {
    /// Notified states, oldest first
    pub fn changes(&self) -> Vec<S> {
        lock(&self.changes).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.changes).len()
    }

    pub fn last(&self) -> Option<S> {
        lock(&self.changes).last().cloned()
    }
}

impl<S> StateListener<S> for RecordingListener<S>
where
    S: PartialEq + Clone + Send + Sync,
{
    fn has_changed(&self, new_state: &S, old_state: &S) -> bool {
        new_state != old_state
    }

    fn on_changed(&self, new_state: &S) {
        lock(&self.changes).push(new_state.clone());
    }
}

/// Fault sink that keeps every fault in memory.
#[derive(Debug, Default)]
pub struct CollectingFaultSink {
    faults: Mutex<Vec<Fault>>,
}

impl CollectingFaultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Vec<Fault> {
        lock(&self.faults).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.faults).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.faults).is_empty()
    }
}

impl FaultSink for CollectingFaultSink {
    fn report(&self, fault: &Fault) {
        lock(&self.faults).push(fault.clone());
    }
}

/// Profile sink that keeps every cycle profile in memory.
#[derive(Debug, Default)]
pub struct CollectingProfileSink {
    profiles: Mutex<Vec<CycleProfile>>,
}

impl CollectingProfileSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profiles(&self) -> Vec<CycleProfile> {
        lock(&self.profiles).clone()
    }
}

impl ProfileSink for CollectingProfileSink {
    fn record(&self, profile: &CycleProfile) {
        lock(&self.profiles).push(profile.clone());
    }
}

/// Assert that an action matching a pattern was recorded.
///
/// # Example
///
/// ```ignore
/// let actions = recorder.actions();
/// assert_recorded!(actions, Action::Increment);
/// assert_recorded!(actions, Action::SetValue(42));
/// ```
#[macro_export]
macro_rules! assert_recorded {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {{
        let actions = &$actions;
        assert!(
            actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` to be recorded, but got: {:?}",
            stringify!($pattern),
            actions
        );
    }};
}

/// Assert that no recorded action matches a pattern.
///
/// ```ignore
/// assert_not_recorded!(recorder.actions(), Action::Quit);
/// ```
#[macro_export]
macro_rules! assert_not_recorded {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {{
        let actions = &$actions;
        assert!(
            !actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` NOT to be recorded, but it was: {:?}",
            stringify!($pattern),
            actions
        );
    }};
}

/// Find the first recorded action matching a pattern.
#[macro_export]
macro_rules! find_recorded {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().find(|a| matches!(a, $pattern $(if $guard)?))
    };
}

/// Count how many recorded actions match a pattern.
///
/// ```ignore
/// assert_eq!(count_recorded!(recorder.actions(), Action::Tick), 3);
/// ```
#[macro_export]
macro_rules! count_recorded {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions
            .iter()
            .filter(|a| matches!(a, $pattern $(if $guard)?))
            .count()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Phase;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Foo,
        Bar(i32),
    }

    impl Action for TestAction {
        fn name(&self) -> &str {
            match self {
                TestAction::Foo => "Foo",
                TestAction::Bar(_) => "Bar",
            }
        }
    }

    #[test]
    fn test_recording_middleware() {
        let recorder = RecordingMiddleware::<u8, TestAction>::new();
        recorder.before(&1, &TestAction::Foo);
        recorder.after(&2, &TestAction::Foo);
        recorder.before(&2, &TestAction::Bar(5));

        assert_eq!(recorder.actions(), vec![TestAction::Foo, TestAction::Bar(5)]);
        assert_eq!(recorder.before_states(), vec![1, 2]);
        assert_eq!(recorder.after_states(), vec![2]);

        recorder.clear();
        assert_eq!(recorder.before_count(), 0);
        assert_eq!(recorder.after_count(), 0);
    }

    #[test]
    fn test_recording_listener() {
        let recorder = RecordingListener::<i32>::new();
        assert!(recorder.has_changed(&1, &0));
        assert!(!recorder.has_changed(&1, &1));

        recorder.on_changed(&1);
        recorder.on_changed(&4);
        assert_eq!(recorder.changes(), vec![1, 4]);
        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.last(), Some(4));
    }

    #[test]
    fn test_collecting_sinks() {
        let faults = CollectingFaultSink::new();
        assert!(faults.is_empty());
        faults.report(&Fault::Middleware {
            action: "x".into(),
            phase: Phase::After,
            message: "oops".into(),
        });
        assert_eq!(faults.len(), 1);

        let profiles = CollectingProfileSink::new();
        profiles.record(&CycleProfile {
            action: "x".into(),
            total: Duration::from_millis(1),
            before: Duration::ZERO,
            reduce: Duration::ZERO,
            notify: Duration::ZERO,
            after: Duration::ZERO,
        });
        assert_eq!(profiles.profiles()[0].action, "x");
    }

    #[test]
    fn test_assert_macros() {
        let actions = vec![TestAction::Foo, TestAction::Bar(42)];

        assert_recorded!(actions, TestAction::Foo);
        assert_recorded!(actions, TestAction::Bar(42));
        assert_recorded!(actions, TestAction::Bar(n) if *n > 40);

        assert_not_recorded!(actions, TestAction::Bar(99));

        let found = find_recorded!(actions, TestAction::Bar(_));
        assert_eq!(found, Some(&TestAction::Bar(42)));

        assert_eq!(count_recorded!(actions, TestAction::Bar(_)), 1);
    }
}
