//! Engine — the explicit handle tying registration, dispatch, and
//! shutdown together.
//!
//! Lifecycle: build the engine, register every rule set, then wrap it in
//! an [`Arc`] and start the notification loop. `register` takes
//! `&mut self`, so the type system enforces that registration is finished
//! before the engine is shared with the listener — which is what makes
//! the lock-free notification path in [`StateEventManager`] sound.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homescript_domain::error::HomeScriptError;
use homescript_domain::schema::{EventSchema, NormalSchema, normalize};
use homescript_domain::state::StateChange;

use crate::dispatch::StateEventManager;
use crate::effectors::EffectorRegistry;
use crate::script::{Script, ScriptManager};

/// The rule engine: effector registry, script contexts, and the
/// state-change dispatcher.
pub struct Engine {
    effectors: EffectorRegistry,
    scripts: ScriptManager,
    state_events: StateEventManager,
}

impl Engine {
    /// Build an engine around a populated effector registry.
    #[must_use]
    pub fn new(effectors: EffectorRegistry) -> Self {
        Self {
            effectors,
            scripts: ScriptManager::new(),
            state_events: StateEventManager::new(),
        }
    }

    /// The effectors rule authors bind actions to.
    #[must_use]
    pub fn effectors(&self) -> &EffectorRegistry {
        &self.effectors
    }

    /// The script registered under `name`, if any.
    #[must_use]
    pub fn script(&self, name: &str) -> Option<&Script> {
        self.scripts.get(name)
    }

    /// Register an event schema under a script name.
    ///
    /// The schema is normalized first — every action checked, every
    /// condition path folded into its event — and only then added to the
    /// index, so a broken schema never registers partially.
    ///
    /// # Errors
    ///
    /// Returns the first normalization error with the originating
    /// [`ArgumentsIncompatible`](homescript_domain::error::ArgumentsIncompatible)
    /// or
    /// [`ConditionIncompatible`](homescript_domain::error::ConditionIncompatible)
    /// intact.
    pub fn register(
        &mut self,
        script_name: &str,
        schema: &EventSchema,
    ) -> Result<(), HomeScriptError> {
        tracing::info!(script = script_name, "registering event schema");
        let table = normalize(schema)?;
        tracing::debug!(script = script_name, entries = table.len(), "schema normalized");
        self.register_normalized(script_name, table);
        Ok(())
    }

    /// Register an already-normalized table under a script name.
    pub fn register_normalized(&mut self, script_name: &str, table: NormalSchema) {
        let script = self.scripts.get_or_create(script_name);
        for (event, actions) in table {
            for action in actions {
                self.state_events.add(event.clone(), script.clone(), action);
            }
        }
    }

    /// Drive one notification to completion.
    pub fn handle_state_change(&self, change: &StateChange) {
        self.state_events.handle(change);
    }

    /// Run the notification loop until the token fires or the bus closes.
    ///
    /// Notifications are handled strictly one at a time: the next `recv`
    /// only happens after the previous notification's matching,
    /// cancellation, and launches are done. A lagging receiver logs the
    /// number of dropped notifications and carries on. The engine shuts
    /// its scripts down when the loop ends.
    pub fn listen(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<StateChange>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    message = receiver.recv() => match message {
                        Ok(change) => engine.handle_state_change(&change),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "state bus lagged, notifications dropped");
                        }
                    }
                }
            }
            engine.shutdown();
        })
    }

    /// Stop every script: in-flight work is cancelled, later actions are
    /// ignored.
    pub fn shutdown(&self) {
        tracing::info!("engine shutting down");
        self.scripts.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use homescript_domain::action::{Action, Function};
    use homescript_domain::event::StateEvent;
    use homescript_domain::schema::ActionSchema;
    use homescript_domain::state::StateValue;

    use crate::event_bus::InProcessStateBus;
    use crate::ports::StatePublisher;

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> Action {
        let counter = Arc::clone(counter);
        Action::new(Function::sync("count", &[], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    fn unchecked(name: &str) -> Action {
        Action::new(Function::sync(name, &["value"], |_| Ok(())))
    }

    fn change(entity_id: &str, old: &str, new: &str) -> StateChange {
        StateChange::new(entity_id, StateValue::new(old), StateValue::new(new))
    }

    #[tokio::test]
    async fn should_register_and_dispatch_schema() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = Engine::new(EffectorRegistry::new());
        let schema: EventSchema = vec![(
            StateEvent::new("switch.hall").to_states(["on"]).unwrap(),
            ActionSchema::from(counting(&counter)),
        )];
        engine.register("hall", &schema).unwrap();

        engine.handle_state_change(&change("switch.hall", "off", "on"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(engine.script("hall").is_some());
    }

    #[tokio::test]
    async fn should_refuse_partial_registration_of_broken_schema() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = Engine::new(EffectorRegistry::new());
        let schema: EventSchema = vec![
            (
                StateEvent::new("switch.hall"),
                ActionSchema::from(counting(&counter)),
            ),
            (
                StateEvent::new("switch.hall"),
                ActionSchema::from(unchecked("broken")),
            ),
        ];
        assert!(engine.register("hall", &schema).is_err());

        // nothing from the schema became live
        engine.handle_state_change(&change("switch.hall", "off", "on"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn should_process_notifications_from_the_bus_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bus = InProcessStateBus::new(16);
        let mut engine = Engine::new(EffectorRegistry::new());
        let schema: EventSchema = vec![(
            StateEvent::new("switch.hall").to_states(["on"]).unwrap(),
            ActionSchema::from(counting(&counter)),
        )];
        engine.register("hall", &schema).unwrap();

        let engine = Arc::new(engine);
        let token = CancellationToken::new();
        let handle = Arc::clone(&engine).listen(bus.subscribe(), token.clone());

        bus.publish(change("switch.hall", "off", "on"));
        bus.publish(change("switch.hall", "on", "off"));
        bus.publish(change("switch.hall", "off", "on"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        token.cancel();
        handle.await.unwrap();
        // the loop stopped the scripts on its way out
        assert!(engine.script("hall").unwrap().is_stopped());
    }

    #[tokio::test]
    async fn should_stop_scripts_on_shutdown() {
        let mut engine = Engine::new(EffectorRegistry::new());
        let schema: EventSchema = vec![(
            StateEvent::new("switch.hall"),
            ActionSchema::from(Action::delay(Duration::from_secs(30))),
        )];
        engine.register("hall", &schema).unwrap();
        engine.handle_state_change(&change("switch.hall", "off", "on"));

        let script = engine.script("hall").unwrap().clone();
        assert_eq!(script.running_tasks(), 1);

        engine.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(script.is_stopped());
        assert_eq!(script.running_tasks(), 0);
    }
}
