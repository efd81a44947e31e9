//! Schema normalization — compiling a nested condition/action tree into a
//! flat event → action-list table.
//!
//! Rule authors describe behavior as a mapping from state events to either
//! actions or further condition-keyed mappings, nested as deep as they
//! like. Normalization flattens each tree bottom-up: every root-to-leaf
//! condition path is conjoined onto the event, and action lists under
//! equal paths merge. Association lists stand in for the original
//! mappings because conditions compare structurally rather than by hash.

use crate::action::Action;
use crate::condition::Condition;
use crate::error::HomeScriptError;
use crate::event::StateEvent;

/// A subtree of the rule schema: actions at the leaves, condition-keyed
/// branches inside.
#[derive(Debug, Clone)]
pub enum ActionSchema {
    /// One or more actions to run when every condition on the path holds.
    Leaf(Vec<Action>),
    /// Condition-keyed sub-schemas.
    Branches(Vec<(Condition, ActionSchema)>),
}

impl From<Action> for ActionSchema {
    fn from(action: Action) -> Self {
        Self::Leaf(vec![action])
    }
}

impl From<Vec<Action>> for ActionSchema {
    fn from(actions: Vec<Action>) -> Self {
        Self::Leaf(actions)
    }
}

/// A full rule schema: action trees keyed by state event.
pub type EventSchema = Vec<(StateEvent, ActionSchema)>;

/// The normalized form: a flat table of event → actions.
pub type NormalSchema = Vec<(StateEvent, Vec<Action>)>;

/// A root-to-leaf sequence of conditions.
pub type ConditionPath = Vec<Condition>;

/// Flatten an action tree into `(condition path, actions)` pairs.
///
/// A leaf yields the empty path (or nothing at all when the action list is
/// empty); a branch prepends its condition to every path produced by its
/// subtree. Identical paths merge by extending the action list.
#[must_use]
pub fn normalize_actions(schema: &ActionSchema) -> Vec<(ConditionPath, Vec<Action>)> {
    match schema {
        ActionSchema::Leaf(actions) if actions.is_empty() => Vec::new(),
        ActionSchema::Leaf(actions) => vec![(Vec::new(), actions.clone())],
        ActionSchema::Branches(branches) => {
            let mut result: Vec<(ConditionPath, Vec<Action>)> = Vec::new();
            for (condition, subtree) in branches {
                for (sub_path, actions) in normalize_actions(subtree) {
                    let mut path = Vec::with_capacity(sub_path.len() + 1);
                    path.push(condition.clone());
                    path.extend(sub_path);
                    match result.iter_mut().find(|(existing, _)| *existing == path) {
                        Some((_, existing)) => existing.extend(actions),
                        None => result.push((path, actions)),
                    }
                }
            }
            result
        }
    }
}

/// Normalize a full event schema.
///
/// Every action is [`check`](Action::check)ed before it enters the result;
/// condition paths are folded into their event left-to-right. The first
/// failure aborts the whole normalization — no partial table is ever
/// produced.
///
/// # Errors
///
/// Returns the originating [`ArgumentsIncompatible`] or
/// [`ConditionIncompatible`] error.
///
/// [`ArgumentsIncompatible`]: crate::error::ArgumentsIncompatible
/// [`ConditionIncompatible`]: crate::error::ConditionIncompatible
pub fn normalize(schema: &EventSchema) -> Result<NormalSchema, HomeScriptError> {
    let mut result: NormalSchema = Vec::new();
    for (event, tree) in schema {
        tracing::debug!(event = %event, "normalizing event subtree");
        for (path, actions) in normalize_actions(tree) {
            for action in &actions {
                action.check()?;
            }
            let mut folded = event.clone();
            for condition in path {
                folded = folded.with(condition)?;
            }
            match result.iter_mut().find(|(existing, _)| *existing == folded) {
                Some((_, existing)) => existing.extend(actions),
                None => result.push((folded, actions)),
            }
        }
    }
    tracing::debug!(entries = result.len(), "schema normalized");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::action::{ArgValue, Function};
    use crate::condition::Condition;

    fn noop(name: &str) -> Action {
        Action::new(Function::sync(name, &[], |_| Ok(())))
    }

    fn unchecked(name: &str) -> Action {
        // declares a parameter nothing binds, so check() fails
        Action::new(Function::sync(name, &["value"], |_| Ok(())))
    }

    fn always(name: &str, value: bool) -> Condition {
        Condition::new(name, move |_| value)
    }

    #[test]
    fn should_yield_empty_path_for_leaf() {
        let table = normalize_actions(&ActionSchema::from(noop("a")));
        assert_eq!(table.len(), 1);
        assert!(table[0].0.is_empty());
        assert_eq!(table[0].1.len(), 1);
    }

    #[test]
    fn should_yield_nothing_for_empty_leaf() {
        let table = normalize_actions(&ActionSchema::Leaf(Vec::new()));
        assert!(table.is_empty());
    }

    #[test]
    fn should_prepend_conditions_along_the_path() {
        let c1 = always("c1", true);
        let c2 = always("c2", true);
        let tree = ActionSchema::Branches(vec![(
            c1.clone(),
            ActionSchema::Branches(vec![(c2.clone(), ActionSchema::from(noop("a")))]),
        )]);
        let table = normalize_actions(&tree);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].0, vec![c1, c2]);
    }

    #[test]
    fn should_merge_action_lists_under_identical_paths() {
        let shared = always("shared", true);
        let tree = ActionSchema::Branches(vec![
            (shared.clone(), ActionSchema::from(noop("a"))),
            (shared.clone(), ActionSchema::from(noop("b"))),
        ]);
        let table = normalize_actions(&tree);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].1.len(), 2);
    }

    #[test]
    fn should_keep_distinct_paths_separate() {
        let tree = ActionSchema::Branches(vec![
            (always("on", true), ActionSchema::from(noop("a"))),
            (always("off", false), ActionSchema::from(noop("b"))),
        ]);
        let table = normalize_actions(&tree);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn should_fold_nested_conditions_like_a_combined_condition() {
        // {c1: {c2: action}} and {(c1 AND c2): action} land on the same
        // event entry.
        let c1 = always("c1", true);
        let c2 = always("c2", true);
        let event = StateEvent::new("switch.hall");

        let nested: EventSchema = vec![(
            event.clone(),
            ActionSchema::Branches(vec![(
                c1.clone(),
                ActionSchema::Branches(vec![(c2.clone(), ActionSchema::from(noop("a")))]),
            )]),
        )];
        let combined: EventSchema = vec![(
            event,
            ActionSchema::Branches(vec![(
                c1.and(c2).unwrap(),
                ActionSchema::from(noop("a")),
            )]),
        )];

        let nested = normalize(&nested).unwrap();
        let combined = normalize(&combined).unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(combined.len(), 1);
        assert_eq!(nested[0].0, combined[0].0);
        assert_eq!(nested[0].1.len(), combined[0].1.len());
    }

    #[test]
    fn should_merge_entries_with_equal_folded_events() {
        let event = StateEvent::new("switch.hall");
        let schema: EventSchema = vec![
            (event.clone(), ActionSchema::from(noop("a"))),
            (event, ActionSchema::from(noop("b"))),
        ];
        let table = normalize(&schema).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].1.len(), 2);
    }

    #[test]
    fn should_abort_whole_normalization_when_check_fails() {
        let schema: EventSchema = vec![
            (StateEvent::new("switch.a"), ActionSchema::from(noop("ok"))),
            (
                StateEvent::new("switch.b"),
                ActionSchema::from(unchecked("broken")),
            ),
        ];
        let err = normalize(&schema).unwrap_err();
        assert!(matches!(err, HomeScriptError::Arguments(_)));
    }

    #[test]
    fn should_abort_when_path_condition_is_incompatible_with_event() {
        let foreign = Condition::with_arguments("bus_only", &["event"], |_| true);
        let schema: EventSchema = vec![(
            StateEvent::new("switch.hall"),
            ActionSchema::Branches(vec![(foreign, ActionSchema::from(noop("a")))]),
        )];
        assert!(matches!(
            normalize(&schema).unwrap_err(),
            HomeScriptError::ConditionIncompatible(_)
        ));
    }

    #[test]
    fn should_not_run_actions_during_normalization() {
        let runs = Arc::new(Mutex::new(0_usize));
        let probe = Arc::clone(&runs);
        let action = Action::new(Function::sync("counted", &["value"], move |_| {
            *probe.lock().unwrap() += 1;
            Ok(())
        }))
        .with_kwarg("value", ArgValue::from(serde_json::json!(1)));

        let schema: EventSchema = vec![(StateEvent::new("switch.hall"), ActionSchema::from(action))];
        normalize(&schema).unwrap();
        assert_eq!(*runs.lock().unwrap(), 0);
    }
}
