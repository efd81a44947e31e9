//! Virtual dimmer — a light with a `brightness` parameter.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use homescript_app::ports::{Effector, StatePublisher};
use homescript_domain::action::{Action, CallArgs, Function};
use homescript_domain::error::HomeScriptError;
use homescript_domain::id::EntityId;
use homescript_domain::state::{StateChange, StateValue};

const FULL_BRIGHTNESS: u64 = 255;

/// A simulated dimmable light.
///
/// `turn_on` accepts an optional `brightness` (pre-bound to null, so the
/// action checks without one); `set_brightness` requires it, so a rule
/// that forgets the argument fails at registration time. Out-of-range
/// values fail the action body at run time.
pub struct VirtualDimmer {
    core: Arc<DimmerCore>,
    turn_on: Action,
    turn_off: Action,
    set_brightness: Action,
}

struct DimmerCore {
    entity_id: EntityId,
    state: Mutex<StateValue>,
    publisher: Arc<dyn StatePublisher>,
}

impl DimmerCore {
    fn snapshot(&self) -> StateValue {
        self.lock_state().clone()
    }

    fn transition(&self, new: StateValue) {
        let old = {
            let mut state = self.lock_state();
            std::mem::replace(&mut *state, new.clone())
        };
        tracing::debug!(entity_id = %self.entity_id, old = %old, new = %new, "dimmer transition");
        self.publisher
            .publish(StateChange::new(self.entity_id.clone(), old, new));
    }

    fn brightness(&self) -> u64 {
        self.lock_state()
            .attributes
            .get("brightness")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(FULL_BRIGHTNESS)
    }

    fn lock_state(&self) -> MutexGuard<'_, StateValue> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VirtualDimmer {
    /// Build a dimmer starting off at full brightness.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, publisher: Arc<dyn StatePublisher>) -> Arc<Self> {
        let core = Arc::new(DimmerCore {
            entity_id: entity_id.into(),
            state: Mutex::new(StateValue::with_attributes(
                "off",
                serde_json::json!({"brightness": FULL_BRIGHTNESS}),
            )),
            publisher,
        });
        Arc::new(Self {
            turn_on: turn_on_action(&core),
            turn_off: turn_off_action(&core),
            set_brightness: set_brightness_action(&core),
            core,
        })
    }
}

impl Effector for VirtualDimmer {
    fn domain(&self) -> &str {
        "light"
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
            "set_brightness" => Some(self.set_brightness.clone()),
            _ => None,
        }
    }
}

/// Read and validate the `brightness` parameter. Null or absent means
/// "not requested".
fn brightness_from(call: &CallArgs) -> Result<Option<u64>, HomeScriptError> {
    match call.param(0, "brightness") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(level) if level <= FULL_BRIGHTNESS => Ok(Some(level)),
            _ => Err(HomeScriptError::action_failed(format!(
                "brightness {value} is not an integer between 0 and {FULL_BRIGHTNESS}"
            ))),
        },
    }
}

fn turn_on_action(core: &Arc<DimmerCore>) -> Action {
    let core = Arc::clone(core);
    Action::new(Function::future(
        format!("{}.turn_on", core.entity_id),
        &["brightness"],
        move |call| {
            let core = Arc::clone(&core);
            async move {
                let brightness = brightness_from(&call)?.unwrap_or_else(|| core.brightness());
                core.transition(StateValue::with_attributes(
                    "on",
                    serde_json::json!({"brightness": brightness}),
                ));
                Ok(())
            }
        },
    ))
    .with_kwarg("brightness", serde_json::Value::Null)
}

fn turn_off_action(core: &Arc<DimmerCore>) -> Action {
    let core = Arc::clone(core);
    Action::new(Function::future(
        format!("{}.turn_off", core.entity_id),
        &[],
        move |_| {
            let core = Arc::clone(&core);
            async move {
                let brightness = core.brightness();
                core.transition(StateValue::with_attributes(
                    "off",
                    serde_json::json!({"brightness": brightness}),
                ));
                Ok(())
            }
        },
    ))
}

fn set_brightness_action(core: &Arc<DimmerCore>) -> Action {
    let core = Arc::clone(core);
    Action::new(Function::future(
        format!("{}.set_brightness", core.entity_id),
        &["brightness"],
        move |call| {
            let core = Arc::clone(&core);
            async move {
                let Some(brightness) = brightness_from(&call)? else {
                    return Err(HomeScriptError::action_failed("brightness is required"));
                };
                let state = core.snapshot().state;
                core.transition(StateValue::with_attributes(
                    state,
                    serde_json::json!({"brightness": brightness}),
                ));
                Ok(())
            }
        },
    ))
}
