//! Reducer trait
//!
//! A reducer takes the running state by value and returns the next state.
//! Every registered reducer is folded over the state in registration order;
//! the first reducer sees the current state, each later one sees the output of
//! the one before it.

use crate::error::ReduceError;

/// A pure state transition: `(state, action) -> state`.
///
/// Reducers must not block and should not fail for expected input. Returning
/// an error, or panicking, aborts the fold for the current cycle and the store
/// keeps its pre-cycle state.
///
/// Any closure of the matching shape is a reducer:
///
/// ```
/// use statelane_core::{NamedAction, ReduceError, Reducer};
///
/// let checked_inc = |state: u8, _: &NamedAction<()>| {
///     state.checked_add(1).ok_or_else(|| ReduceError::new("overflow"))
/// };
/// assert_eq!(checked_inc.reduce(1, &NamedAction::bare("inc")), Ok(2));
/// assert!(checked_inc.reduce(255, &NamedAction::bare("inc")).is_err());
/// ```
pub trait Reducer<S, A>: Send + Sync {
    fn reduce(&self, state: S, action: &A) -> Result<S, ReduceError>;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(S, &A) -> Result<S, ReduceError> + Send + Sync,
{
    fn reduce(&self, state: S, action: &A) -> Result<S, ReduceError> {
        self(state, action)
    }
}

/// Reducer adapter for infallible functions. Created by [`pure`].
#[derive(Debug, Clone, Copy)]
pub struct Pure<F>(F);

/// Wrap an infallible `Fn(S, &A) -> S` as a reducer.
///
/// ```
/// use statelane_core::{pure, NamedAction, Reducer};
///
/// let double = pure(|state: i64, _: &NamedAction<()>| state * 2);
/// assert_eq!(double.reduce(4, &NamedAction::bare("x")), Ok(8));
/// ```
pub fn pure<F>(f: F) -> Pure<F> {
    Pure(f)
}

impl<S, A, F> Reducer<S, A> for Pure<F>
where
    F: Fn(S, &A) -> S + Send + Sync,
{
    fn reduce(&self, state: S, action: &A) -> Result<S, ReduceError> {
        Ok((self.0)(state, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, NamedAction};

    type TestAction = NamedAction<i32>;

    fn add(state: i32, action: &TestAction) -> Result<i32, ReduceError> {
        match action.name() {
            "add" => Ok(state + action.payload()),
            "fail" => Err(ReduceError::new("refused")),
            _ => Ok(state),
        }
    }

    #[test]
    fn test_fn_reducer() {
        assert_eq!(add.reduce(1, &NamedAction::new("add", 2)), Ok(3));
        assert_eq!(add.reduce(1, &NamedAction::new("other", 2)), Ok(1));
        assert_eq!(
            add.reduce(1, &NamedAction::new("fail", 0)),
            Err(ReduceError::new("refused"))
        );
    }

    #[test]
    fn test_pure_reducer() {
        let negate = pure(|state: i32, _: &TestAction| -state);
        assert_eq!(negate.reduce(5, &NamedAction::new("neg", 0)), Ok(-5));
    }

    #[test]
    fn test_boxed_reducers_compose() {
        let reducers: Vec<Box<dyn Reducer<i32, TestAction>>> = vec![
            Box::new(pure(|s: i32, _: &TestAction| s + 1)),
            Box::new(pure(|s: i32, _: &TestAction| s * 2)),
        ];
        let action = NamedAction::new("x", 0);
        let folded = reducers
            .iter()
            .try_fold(3, |state, reducer| reducer.reduce(state, &action));
        assert_eq!(folded, Ok(8));
    }
}
