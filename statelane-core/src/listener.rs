//! State listeners
//!
//! After each successful fold, every listener is asked whether the change is
//! relevant to it and, if so, notified with the new state. Listeners run
//! concurrently with each other, but `on_changed` is only ever called after
//! the same listener's `has_changed` returned `true` for that cycle.

/// Change detection and notification.
///
/// `has_changed` must be a pure comparison. `on_changed` may perform side
/// effects, including dispatching new actions, but must not add or remove
/// hooks on the store that is notifying it.
pub trait StateListener<S>: Send + Sync {
    /// Whether `new_state` differs from `old_state` in a way this listener cares about
    fn has_changed(&self, new_state: &S, old_state: &S) -> bool;

    /// Called with the post-cycle state when `has_changed` returned `true`
    fn on_changed(&self, new_state: &S);
}

/// Listener assembled from two closures. Created by [`listener`].
#[derive(Debug, Clone, Copy)]
pub struct FnListener<C, F> {
    has_changed: C,
    on_changed: F,
}

/// Build a listener from a comparison and a callback.
///
/// ```
/// use statelane_core::{listener, StateListener};
///
/// let parity = listener(|new: &i32, old: &i32| new % 2 != old % 2, |_: &i32| {});
/// assert!(parity.has_changed(&3, &2));
/// assert!(!parity.has_changed(&4, &2));
/// ```
pub fn listener<C, F>(has_changed: C, on_changed: F) -> FnListener<C, F> {
    FnListener {
        has_changed,
        on_changed,
    }
}

impl<S, C, F> StateListener<S> for FnListener<C, F>
where
    C: Fn(&S, &S) -> bool + Send + Sync,
    F: Fn(&S) + Send + Sync,
{
    fn has_changed(&self, new_state: &S, old_state: &S) -> bool {
        (self.has_changed)(new_state, old_state)
    }

    fn on_changed(&self, new_state: &S) {
        (self.on_changed)(new_state)
    }
}

/// Listener notified whenever the whole state changes. Created by [`watch`].
#[derive(Debug, Clone, Copy)]
pub struct Watch<F>(F);

/// Notify `on_changed` whenever the new state is not equal to the old one.
pub fn watch<F>(on_changed: F) -> Watch<F> {
    Watch(on_changed)
}

impl<S, F> StateListener<S> for Watch<F>
where
    S: PartialEq,
    F: Fn(&S) + Send + Sync,
{
    fn has_changed(&self, new_state: &S, old_state: &S) -> bool {
        new_state != old_state
    }

    fn on_changed(&self, new_state: &S) {
        (self.0)(new_state)
    }
}

/// Listener notified when a projection of the state changes. Created by [`select`].
#[derive(Debug, Clone, Copy)]
pub struct Select<P, F> {
    project: P,
    on_changed: F,
}

/// Notify `on_changed` with the projected value whenever it changes.
///
/// ```
/// use statelane_core::{select, StateListener};
///
/// #[derive(Clone)]
/// struct Todo { title: String, done: bool }
///
/// let on_done = select(|t: &Todo| t.done, |done: &bool| println!("done = {done}"));
/// let open = Todo { title: "milk".into(), done: false };
/// let renamed = Todo { title: "oat milk".into(), done: false };
/// assert!(!on_done.has_changed(&renamed, &open));
/// ```
pub fn select<P, F>(project: P, on_changed: F) -> Select<P, F> {
    Select {
        project,
        on_changed,
    }
}

impl<S, T, P, F> StateListener<S> for Select<P, F>
where
    T: PartialEq,
    P: Fn(&S) -> T + Send + Sync,
    F: Fn(&T) + Send + Sync,
{
    fn has_changed(&self, new_state: &S, old_state: &S) -> bool {
        (self.project)(new_state) != (self.project)(old_state)
    }

    fn on_changed(&self, new_state: &S) {
        (self.on_changed)(&(self.project)(new_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i32,
        label: &'static str,
    }

    #[test]
    fn test_watch_uses_partial_eq() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let watcher = watch(move |_: &Counter| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let a = Counter { value: 1, label: "a" };
        let b = Counter { value: 1, label: "b" };
        assert!(!watcher.has_changed(&a, &a.clone()));
        assert!(watcher.has_changed(&b, &a));

        watcher.on_changed(&b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_select_projects() {
        let last = Arc::new(AtomicUsize::new(0));
        let sink = last.clone();
        let on_value = select(
            |c: &Counter| c.value,
            move |v: &i32| sink.store(*v as usize, Ordering::SeqCst),
        );

        let old = Counter { value: 1, label: "a" };
        let relabeled = Counter { value: 1, label: "z" };
        let bumped = Counter { value: 7, label: "a" };

        assert!(!on_value.has_changed(&relabeled, &old));
        assert!(on_value.has_changed(&bumped, &old));

        on_value.on_changed(&bumped);
        assert_eq!(last.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_fn_listener_as_trait_object() {
        let boxed: Box<dyn StateListener<i32>> =
            Box::new(listener(|new: &i32, old: &i32| new > old, |_: &i32| {}));
        assert!(boxed.has_changed(&2, &1));
        assert!(!boxed.has_changed(&1, &2));
    }
}
