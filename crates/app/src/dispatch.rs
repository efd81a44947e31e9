//! State-change dispatch — matching notifications against registered
//! rules and preempting the target scripts.
//!
//! The index maps entity ids to registration triples. It is mutated only
//! during rule registration; the notification path reads it without
//! locking, which is sound because registration strictly precedes
//! notification delivery (see [`crate::engine::Engine`]).

use std::collections::HashMap;

use homescript_domain::action::Action;
use homescript_domain::event::StateEvent;
use homescript_domain::id::EntityId;
use homescript_domain::state::StateChange;

use crate::script::Script;

/// One registered rule: when `event` matches, `script` runs `action`.
pub struct Registration {
    pub event: StateEvent,
    pub script: Script,
    pub action: Action,
}

/// Index of entity id → registrations, driving per-notification dispatch.
///
/// An entity with no registrations is simply absent.
#[derive(Default)]
pub struct StateEventManager {
    triggers: HashMap<EntityId, Vec<Registration>>,
}

impl StateEventManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration. No de-duplication is attempted.
    pub fn add(&mut self, event: StateEvent, script: Script, action: Action) {
        tracing::debug!(event = %event, script = %script, action = %action, "registering");
        self.triggers
            .entry(event.entity_id().clone())
            .or_default()
            .push(Registration {
                event,
                script,
                action,
            });
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triggers.values().map(Vec::len).sum()
    }

    /// Whether anything is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Process one notification to completion.
    ///
    /// Every registration for the affected entity is tested against the
    /// `{entity_id, old, new}` arguments (an unconditioned event always
    /// matches; an evaluation error is logged and treated as no match).
    /// Matches are grouped by script in insertion order, then each script
    /// is preempted exactly once — cancel its running tasks, hand over the
    /// new actions. The pass itself never suspends: launched asynchronous
    /// work only runs after this returns.
    pub fn handle(&self, change: &StateChange) {
        tracing::debug!(entity_id = %change.entity_id, "state change notification");
        let Some(registrations) = self.triggers.get(&change.entity_id) else {
            return;
        };
        let args = change.arg_map();

        let mut plan: Vec<(&Script, Vec<&Action>)> = Vec::new();
        for registration in registrations {
            match registration.event.matches_with(&args) {
                Ok(true) => {
                    match plan
                        .iter_mut()
                        .find(|entry| entry.0 == &registration.script)
                    {
                        Some(entry) => entry.1.push(&registration.action),
                        None => plan.push((&registration.script, vec![&registration.action])),
                    }
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(
                        event = %registration.event,
                        %error,
                        "condition evaluation failed, treating as no match"
                    );
                }
            }
        }
        tracing::debug!(scripts = plan.len(), "matched scripts");

        for (script, actions) in plan {
            tracing::debug!(script = %script, actions = actions.len(), "preempt and run");
            script.cancel_all_tasks();
            for action in actions {
                script.run_action(action);
            }
        }
        tracing::debug!(entity_id = %change.entity_id, "notification processed");
    }
}
