//! Common error types used across the workspace.
//!
//! The top-level [`HomeScriptError`] wraps typed errors via `#[from]`.
//! Construction-time and registration-time errors (condition composition,
//! schema normalization, `Action::check`) abort the whole registration;
//! run-time errors inside action bodies are caught and logged by the
//! script execution context and never reach the dispatcher.

use thiserror::Error;

/// Top-level error for the homescript engine.
#[derive(Debug, Error)]
pub enum HomeScriptError {
    /// An action's bound arguments do not satisfy a function's declared
    /// parameters.
    #[error(transparent)]
    Arguments(#[from] ArgumentsIncompatible),

    /// A condition was evaluated with a keyword set differing from its
    /// declared fixed set.
    #[error(transparent)]
    ConditionArguments(#[from] ConditionArgumentMismatch),

    /// Conditions or events with conflicting fixed argument sets were
    /// composed.
    #[error(transparent)]
    ConditionIncompatible(#[from] ConditionIncompatible),

    /// A requested effector is not registered.
    #[error(transparent)]
    EffectorNotFound(#[from] EffectorNotFound),

    /// Two actions cannot be joined into a sequence.
    #[error(transparent)]
    Sequence(#[from] InvalidSequence),

    /// A state in the declarative graph is misused or cannot be resolved.
    #[error(transparent)]
    State(#[from] InvalidState),

    /// An action containing asynchronous work was executed through the
    /// synchronous path.
    #[error("cannot run async {action} on the synchronous path")]
    AsyncActionRun {
        /// Rendered action description.
        action: String,
    },

    /// An action body reported a failure at run time.
    #[error("action failed: {message}")]
    ActionFailed {
        /// Human-readable failure description.
        message: String,
    },
}

impl HomeScriptError {
    /// Shorthand for a run-time action failure.
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::ActionFailed {
            message: message.into(),
        }
    }
}

/// An action's bound arguments cannot satisfy a function's parameters.
#[derive(Debug, Error)]
#[error("{function} is not satisfied by the bound arguments: {reason}")]
pub struct ArgumentsIncompatible {
    /// Name of the offending function.
    pub function: String,
    /// Which parameters are missing or in excess.
    pub reason: String,
}

/// A condition received a keyword set that differs from its declared one.
#[derive(Debug, Error)]
#[error("condition {condition} expects arguments [{expected}], got [{supplied}]")]
pub struct ConditionArgumentMismatch {
    /// Rendered condition description.
    pub condition: String,
    /// Comma-joined declared argument names.
    pub expected: String,
    /// Comma-joined supplied argument names.
    pub supplied: String,
}

/// Two conditions (or a condition and an event) declare conflicting
/// argument sets and cannot be combined.
#[derive(Debug, Error)]
#[error("{left} is not compatible with {right}: argument sets differ")]
pub struct ConditionIncompatible {
    /// Rendered left-hand side.
    pub left: String,
    /// Rendered right-hand side.
    pub right: String,
}

/// No effector is registered under the requested domain and entity id.
#[derive(Debug, Error)]
#[error("no {domain} effector with entity id {entity_id}")]
pub struct EffectorNotFound {
    /// Effector domain, e.g. `"light"`.
    pub domain: String,
    /// Requested entity id.
    pub entity_id: String,
}

/// Two actions cannot be joined left-to-right.
#[derive(Debug, Error)]
#[error("invalid action sequence: {reason}")]
pub struct InvalidSequence {
    /// Why the sequence is rejected.
    pub reason: String,
}

/// A declarative state is misused or its event sources cannot be resolved.
#[derive(Debug, Error)]
#[error("state {state}: {reason}")]
pub struct InvalidState {
    /// Name of the state.
    pub state: String,
    /// Why the state is rejected.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_render_arguments_incompatible() {
        let err = ArgumentsIncompatible {
            function: "turn_on".to_string(),
            reason: "missing arguments: brightness".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "turn_on is not satisfied by the bound arguments: missing arguments: brightness"
        );
    }

    #[test]
    fn should_render_effector_not_found() {
        let err = EffectorNotFound {
            domain: "light".to_string(),
            entity_id: "light.hall".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no light effector with entity id light.hall"
        );
    }

    #[test]
    fn should_wrap_typed_errors_transparently() {
        let err: HomeScriptError = ConditionIncompatible {
            left: "a".to_string(),
            right: "b".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "a is not compatible with b: argument sets differ"
        );
    }
}
