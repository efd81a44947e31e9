//! End-to-end scenarios: virtual devices wired through the bus into the
//! engine, exercising dispatch, preemption, and script isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use homescript_adapter_virtual::{VirtualDimmer, VirtualSwitch};
use homescript_app::effectors::EffectorRegistry;
use homescript_app::engine::Engine;
use homescript_app::event_bus::InProcessStateBus;
use homescript_app::ports::{Effector, StatePublisher};
use homescript_domain::action::{Action, Function};
use homescript_domain::event::StateEvent;
use homescript_domain::schema::{ActionSchema, EventSchema};
use homescript_domain::state::{StateChange, StateValue};

fn change(entity_id: &str, old: &str, new: &str) -> StateChange {
    StateChange::new(entity_id, StateValue::new(old), StateValue::new(new))
}

fn counting(counter: &Arc<AtomicUsize>) -> Action {
    let counter = Arc::clone(counter);
    Action::new(Function::sync("count", &[], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
}

/// Starts, sleeps for `delay`, then counts — cancellable in the middle.
fn slow_then_count(
    started: &Arc<AtomicUsize>,
    finished: &Arc<AtomicUsize>,
    delay: Duration,
) -> Action {
    let started = Arc::clone(started);
    let begin = Action::new(Function::sync("begin", &[], move |_| {
        started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    let finished = Arc::clone(finished);
    let end = Action::new(Function::sync("end", &[], move |_| {
        finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    begin
        .then(Action::delay(delay))
        .unwrap()
        .then(end)
        .unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

#[tokio::test]
async fn should_turn_on_light_once_for_matching_notification() {
    let bus = Arc::new(InProcessStateBus::new(64));
    let publisher: Arc<dyn StatePublisher> = bus.clone();
    let light = VirtualDimmer::new("light.hall", publisher);

    let mut effectors = EffectorRegistry::new();
    effectors.register(light.clone());

    let mut engine = Engine::new(effectors);
    let turn_on = light
        .action("turn_on")
        .unwrap()
        .with_kwarg("brightness", serde_json::json!(100));
    let schema: EventSchema = vec![(
        StateEvent::new("switch.hall"),
        ActionSchema::from(turn_on),
    )];
    engine.register("hall", &schema).unwrap();

    let engine = Arc::new(engine);
    let token = CancellationToken::new();
    let handle = Arc::clone(&engine).listen(bus.subscribe(), token.clone());
    let mut probe = bus.subscribe();

    bus.publish(change("switch.hall", "off", "on"));
    settle().await;

    let state = light.state();
    assert_eq!(state.state, "on");
    assert_eq!(state.attributes["brightness"], 100);
    assert_eq!(engine.script("hall").unwrap().running_tasks(), 0);

    // exactly one transition was published for the light
    let mut light_changes = 0;
    while let Ok(received) = probe.try_recv() {
        if received.entity_id.as_str() == "light.hall" {
            light_changes += 1;
        }
    }
    assert_eq!(light_changes, 1);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn should_cancel_running_task_before_launching_new_one() {
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let mut engine = Engine::new(EffectorRegistry::new());
    let schema: EventSchema = vec![(
        StateEvent::new("switch.hall"),
        ActionSchema::from(slow_then_count(&started, &finished, Duration::from_secs(30))),
    )];
    engine.register("hall", &schema).unwrap();

    engine.handle_state_change(&change("switch.hall", "off", "on"));
    settle().await;
    assert_eq!(started.load(Ordering::SeqCst), 1);

    engine.handle_state_change(&change("switch.hall", "on", "off"));
    settle().await;

    // the first unit was cancelled mid-sleep (it never finished) and
    // removed itself; only the second remains alive
    let script = engine.script("hall").unwrap();
    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(script.running_tasks(), 1);
}

#[tokio::test]
async fn should_trigger_independent_scripts_without_cross_cancellation() {
    let started_a = Arc::new(AtomicUsize::new(0));
    let finished_a = Arc::new(AtomicUsize::new(0));
    let counter_b = Arc::new(AtomicUsize::new(0));

    let mut engine = Engine::new(EffectorRegistry::new());
    let schema_a: EventSchema = vec![(
        StateEvent::new("switch.hall"),
        ActionSchema::from(slow_then_count(
            &started_a,
            &finished_a,
            Duration::from_millis(40),
        )),
    )];
    let schema_b: EventSchema = vec![(
        StateEvent::new("switch.hall"),
        ActionSchema::from(counting(&counter_b)),
    )];
    engine.register("a", &schema_a).unwrap();
    engine.register("b", &schema_b).unwrap();

    // one notification reaches both scripts; script b's run must not
    // cancel script a's in-flight task
    engine.handle_state_change(&change("switch.hall", "off", "on"));
    assert_eq!(counter_b.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(started_a.load(Ordering::SeqCst), 1);
    assert_eq!(finished_a.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn should_route_button_presses_through_nested_schema() {
    let bus = Arc::new(InProcessStateBus::new(64));
    let publisher: Arc<dyn StatePublisher> = bus.clone();
    let button = VirtualSwitch::new("switch.hall_button", publisher.clone());
    let light = VirtualDimmer::new("light.hall", publisher);

    let mut effectors = EffectorRegistry::new();
    effectors.register(button.clone());
    effectors.register(light.clone());

    let light_probe = light.clone();
    let light_is_on =
        homescript_domain::condition::Condition::property("light_is_on", move || {
            light_probe.state().state == "on"
        });
    let light_is_off = light_is_on.clone().invert();

    let turn_on = light
        .action("turn_on")
        .unwrap()
        .with_kwarg("brightness", serde_json::json!(30));
    let turn_off = light.action("turn_off").unwrap();

    let mut engine = Engine::new(effectors);
    let schema: EventSchema = vec![(
        StateEvent::new("switch.hall_button").to_states(["on"]).unwrap(),
        ActionSchema::Branches(vec![
            (light_is_on, ActionSchema::from(turn_off)),
            (light_is_off, ActionSchema::from(turn_on)),
        ]),
    )];
    engine.register("hall", &schema).unwrap();

    let engine = Arc::new(engine);
    let token = CancellationToken::new();
    let handle = Arc::clone(&engine).listen(bus.subscribe(), token.clone());

    button.set("on");
    settle().await;
    assert_eq!(light.state().state, "on");
    assert_eq!(light.state().attributes["brightness"], 30);

    button.set("off");
    settle().await;
    assert_eq!(light.state().state, "on");

    button.set("on");
    settle().await;
    assert_eq!(light.state().state, "off");

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn should_ignore_notifications_after_shutdown() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut engine = Engine::new(EffectorRegistry::new());
    let schema: EventSchema = vec![(
        StateEvent::new("switch.hall"),
        ActionSchema::from(counting(&counter)),
    )];
    engine.register("hall", &schema).unwrap();

    engine.handle_state_change(&change("switch.hall", "off", "on"));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    engine.shutdown();
    engine.handle_state_change(&change("switch.hall", "off", "on"));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
