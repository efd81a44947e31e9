//! State event — a state change of one entity, optionally narrowed by a
//! condition over `{entity_id, old, new}`.

use std::collections::BTreeSet;
use std::fmt;

use crate::condition::{ArgMap, Condition};
use crate::error::{ConditionIncompatible, HomeScriptError};
use crate::id::EntityId;
use crate::state::StateChange;

/// Argument names a state-event filter is evaluated with.
pub const STATE_EVENT_ARGS: [&str; 3] = ["entity_id", "old", "new"];

/// A state change of a specific entity, optionally narrowed by a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEvent {
    entity_id: EntityId,
    condition: Option<Condition>,
}

impl StateEvent {
    /// Describe every state change of the given entity.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            condition: None,
        }
    }

    /// The entity this descriptor watches.
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// The attached filter, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Attach a filter, conjoining with any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionIncompatible`] when the condition declares an
    /// argument set other than [`STATE_EVENT_ARGS`].
    pub fn with(self, condition: Condition) -> Result<Self, HomeScriptError> {
        ensure_state_filter(&condition, &self)?;
        let condition = match self.condition {
            None => condition,
            Some(existing) => existing.and(condition)?,
        };
        Ok(Self {
            entity_id: self.entity_id,
            condition: Some(condition),
        })
    }

    /// Narrow to changes leaving one of the given states.
    ///
    /// # Errors
    ///
    /// Propagates filter-composition failures.
    pub fn from_states<I, S>(self, states: I) -> Result<Self, HomeScriptError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(old_state_condition(states))
    }

    /// Narrow to changes entering one of the given states.
    ///
    /// # Errors
    ///
    /// Propagates filter-composition failures.
    pub fn to_states<I, S>(self, states: I) -> Result<Self, HomeScriptError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(new_state_condition(states))
    }

    /// Test the attached filter against a pre-built argument map. An
    /// unconditioned event always matches.
    ///
    /// # Errors
    ///
    /// Propagates condition evaluation failures.
    pub fn matches_with(&self, args: &ArgMap) -> Result<bool, HomeScriptError> {
        match &self.condition {
            None => Ok(true),
            Some(condition) => condition.evaluate(args),
        }
    }

    /// Test against a notification.
    ///
    /// # Errors
    ///
    /// Propagates condition evaluation failures.
    pub fn matches(&self, change: &StateChange) -> Result<bool, HomeScriptError> {
        self.matches_with(&change.arg_map())
    }
}

fn ensure_state_filter(
    condition: &Condition,
    event: &StateEvent,
) -> Result<(), ConditionIncompatible> {
    let fixed: BTreeSet<String> = STATE_EVENT_ARGS.iter().map(ToString::to_string).collect();
    if condition.accepts_arguments(&fixed) {
        Ok(())
    } else {
        Err(ConditionIncompatible {
            left: condition.to_string(),
            right: event.to_string(),
        })
    }
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state event of {}", self.entity_id)?;
        if let Some(condition) = &self.condition {
            write!(f, " with {condition}")?;
        }
        Ok(())
    }
}

/// A condition over the state-event argument set.
pub fn state_condition(
    name: impl Into<String>,
    predicate: impl Fn(&ArgMap) -> bool + Send + Sync + 'static,
) -> Condition {
    Condition::with_arguments(name, &STATE_EVENT_ARGS, predicate)
}

/// True when the old state is one of the given values.
pub fn old_state_condition<I, S>(states: I) -> Condition
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    state_set_condition("old", states)
}

/// True when the new state is one of the given values.
pub fn new_state_condition<I, S>(states: I) -> Condition
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    state_set_condition("new", states)
}

fn state_set_condition<I, S>(side: &'static str, states: I) -> Condition
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let set: BTreeSet<String> = states.into_iter().map(Into::into).collect();
    let name = format!(
        "{side}_states[{}]",
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    state_condition(name, move |args| {
        args.get(side)
            .and_then(|value| value.get("state"))
            .and_then(serde_json::Value::as_str)
            .is_some_and(|state| set.contains(state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateValue;

    fn change(old: &str, new: &str) -> StateChange {
        StateChange::new("switch.hall", StateValue::new(old), StateValue::new(new))
    }

    #[test]
    fn should_always_match_without_condition() {
        let event = StateEvent::new("switch.hall");
        assert!(event.matches(&change("off", "on")).unwrap());
    }

    #[test]
    fn should_match_transitions_entering_a_state_set() {
        let event = StateEvent::new("switch.hall")
            .to_states(["on", "dim"])
            .unwrap();
        assert!(event.matches(&change("off", "on")).unwrap());
        assert!(event.matches(&change("off", "dim")).unwrap());
        assert!(!event.matches(&change("on", "off")).unwrap());
    }

    #[test]
    fn should_match_transitions_leaving_a_state_set() {
        let event = StateEvent::new("switch.hall").from_states(["click"]).unwrap();
        assert!(event.matches(&change("click", "off")).unwrap());
        assert!(!event.matches(&change("off", "click")).unwrap());
    }

    #[test]
    fn should_conjoin_old_and_new_filters() {
        let event = StateEvent::new("switch.hall")
            .from_states(["click"])
            .unwrap()
            .to_states(["long"])
            .unwrap();
        assert!(event.matches(&change("click", "long")).unwrap());
        assert!(!event.matches(&change("click", "off")).unwrap());
        assert!(!event.matches(&change("off", "long")).unwrap());
    }

    #[test]
    fn should_accept_unconstrained_condition() {
        let event = StateEvent::new("switch.hall")
            .with(Condition::new("always", |_| true))
            .unwrap();
        assert!(event.matches(&change("off", "on")).unwrap());
    }

    #[test]
    fn should_reject_condition_with_foreign_arguments() {
        let foreign = Condition::with_arguments("bus_only", &["event"], |_| true);
        let err = StateEvent::new("switch.hall").with(foreign).unwrap_err();
        assert!(matches!(err, HomeScriptError::ConditionIncompatible(_)));
    }

    #[test]
    fn should_display_event_with_condition() {
        let event = StateEvent::new("switch.hall");
        assert_eq!(event.to_string(), "state event of switch.hall");
        let event = event.to_states(["on"]).unwrap();
        assert_eq!(
            event.to_string(),
            "state event of switch.hall with new_states[on]"
        );
    }

    #[test]
    fn should_compare_clones_equal() {
        let event = StateEvent::new("switch.hall").to_states(["on"]).unwrap();
        assert_eq!(event, event.clone());
        assert_ne!(event, StateEvent::new("switch.hall"));
    }
}
