//! Action trait and the generic named action record

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Marker trait for actions that can be dispatched to the store
///
/// Actions represent intents to change state. They should be:
/// - Clone: Actions may be logged, replayed, or handed to several hooks
/// - Debug: For debugging and logging
/// - Send + Sync + 'static: Actions cross into the worker lane and are shared
///   by reference with hooks running on the fan-out pool
///
/// Use `#[derive(Action)]` from `statelane-macros` to auto-implement this trait
/// for enums.
pub trait Action: Clone + Debug + Send + Sync + 'static {
    /// Get the action name for logging, filtering, and cycle profiles
    fn name(&self) -> &str;
}

/// An action made of a name and an opaque payload.
///
/// Useful when actions are not known at compile time, or when the payload is
/// produced by another system.
///
/// ```
/// use statelane_core::{Action, NamedAction};
///
/// let action = NamedAction::new("user/rename", String::from("ada"));
/// assert_eq!(action.name(), "user/rename");
/// assert_eq!(action.payload(), "ada");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedAction<P> {
    name: String,
    payload: P,
}

/// A named action carrying an arbitrary JSON payload.
pub type JsonAction = NamedAction<serde_json::Value>;

impl<P> NamedAction<P> {
    /// Create a new action.
    pub fn new(name: impl Into<String>, payload: P) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Get the payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Split into name and payload.
    pub fn into_parts(self) -> (String, P) {
        (self.name, self.payload)
    }
}

impl NamedAction<()> {
    /// Create an action with no payload.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, ())
    }
}

impl<P> Action for NamedAction<P>
where
    P: Clone + Debug + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_action_parts() {
        let action = NamedAction::new("inc", 3u32);
        assert_eq!(action.name(), "inc");
        assert_eq!(*action.payload(), 3);

        let (name, payload) = action.into_parts();
        assert_eq!(name, "inc");
        assert_eq!(payload, 3);
    }

    #[test]
    fn test_bare_action() {
        let action = NamedAction::bare("reset");
        assert_eq!(action.name(), "reset");
        assert_eq!(action.payload(), &());
    }

    #[test]
    fn test_json_action_serde() {
        let action: JsonAction = NamedAction::new("todo/add", json!({ "title": "milk" }));
        let encoded = serde_json::to_value(&action).unwrap();
        assert_eq!(encoded, json!({ "name": "todo/add", "payload": { "title": "milk" } }));

        let decoded: JsonAction = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, action);
    }
}
