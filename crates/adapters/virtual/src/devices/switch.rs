//! Virtual switch — responds to `turn_on`, `turn_off`, `toggle`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use homescript_app::ports::{Effector, StatePublisher};
use homescript_domain::action::{Action, Function};
use homescript_domain::id::EntityId;
use homescript_domain::state::{StateChange, StateValue};

/// A simulated switch. Operations are exposed as bound actions built once
/// at construction; every transition is published to the state bus.
pub struct VirtualSwitch {
    core: Arc<SwitchCore>,
    turn_on: Action,
    turn_off: Action,
    toggle: Action,
}

struct SwitchCore {
    entity_id: EntityId,
    state: Mutex<StateValue>,
    publisher: Arc<dyn StatePublisher>,
}

impl SwitchCore {
    fn snapshot(&self) -> StateValue {
        self.lock_state().clone()
    }

    fn transition(&self, new: StateValue) {
        let old = {
            let mut state = self.lock_state();
            std::mem::replace(&mut *state, new.clone())
        };
        tracing::debug!(entity_id = %self.entity_id, old = %old, new = %new, "switch transition");
        self.publisher
            .publish(StateChange::new(self.entity_id.clone(), old, new));
    }

    fn lock_state(&self) -> MutexGuard<'_, StateValue> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VirtualSwitch {
    /// Build a switch starting in the `off` state.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, publisher: Arc<dyn StatePublisher>) -> Arc<Self> {
        let core = Arc::new(SwitchCore {
            entity_id: entity_id.into(),
            state: Mutex::new(StateValue::new("off")),
            publisher,
        });
        Arc::new(Self {
            turn_on: set_state_action(&core, "turn_on", "on"),
            turn_off: set_state_action(&core, "turn_off", "off"),
            toggle: toggle_action(&core),
            core,
        })
    }

    /// Force a state, simulating an external change (a physical press, a
    /// host update). Publishes the transition like any other.
    pub fn set(&self, state: impl Into<String>) {
        self.core.transition(StateValue::new(state));
    }
}

impl Effector for VirtualSwitch {
    fn domain(&self) -> &str {
        "switch"
    }

    fn entity_id(&self) -> &EntityId {
        &self.core.entity_id
    }

    fn state(&self) -> StateValue {
        self.core.snapshot()
    }

    fn action(&self, operation: &str) -> Option<Action> {
        match operation {
            "turn_on" => Some(self.turn_on.clone()),
            "turn_off" => Some(self.turn_off.clone()),
            "toggle" => Some(self.toggle.clone()),
            _ => None,
        }
    }
}

fn set_state_action(core: &Arc<SwitchCore>, operation: &str, target: &'static str) -> Action {
    let core = Arc::clone(core);
    Action::new(Function::future(
        format!("{}.{operation}", core.entity_id),
        &[],
        move |_| {
            let core = Arc::clone(&core);
            async move {
                core.transition(StateValue::new(target));
                Ok(())
            }
        },
    ))
}

fn toggle_action(core: &Arc<SwitchCore>) -> Action {
    let core = Arc::clone(core);
    Action::new(Function::future(
        format!("{}.toggle", core.entity_id),
        &[],
        move |_| {
            let core = Arc::clone(&core);
            async move {
                let target = if core.snapshot().state == "on" {
                    "off"
                } else {
                    "on"
                };
                core.transition(StateValue::new(target));
                Ok(())
            }
        },
    ))
}
