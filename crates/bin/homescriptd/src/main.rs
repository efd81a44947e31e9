//! # homescriptd — homescript demo daemon
//!
//! Composition root that wires the virtual devices, the in-process state
//! bus, and the rule engine together, registers a demo rule set, and then
//! replays a short scripted scenario before waiting for ctrl-c.
//!
//! ## Responsibilities
//! - Initialize tracing from the environment
//! - Construct the bus, the virtual effectors, and the registry
//! - Register rule schemas (all registration happens before the
//!   notification loop starts)
//! - Run the notification loop and shut down gracefully
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no rule logic belongs here.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use homescript_adapter_virtual::{VirtualDimmer, VirtualSwitch};
use homescript_app::effectors::EffectorRegistry;
use homescript_app::engine::Engine;
use homescript_app::event_bus::InProcessStateBus;
use homescript_app::ports::{Effector, StatePublisher};
use homescript_domain::action::Action;
use homescript_domain::condition::Condition;
use homescript_domain::event::StateEvent;
use homescript_domain::schema::{ActionSchema, EventSchema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,homescript_app=debug,homescript_domain=debug")
            }),
        )
        .init();

    // State bus
    let bus = Arc::new(InProcessStateBus::new(256));
    let receiver = bus.subscribe();

    // Virtual devices
    let publisher: Arc<dyn StatePublisher> = bus.clone();
    let button = VirtualSwitch::new("switch.hall_button", publisher.clone());
    let light = VirtualDimmer::new("light.hall", publisher);

    // Effectors
    let mut effectors = EffectorRegistry::new();
    effectors.register(button.clone());
    effectors.register(light);

    // Engine + rules; registration completes before the loop starts
    let mut engine = Engine::new(effectors);
    let schema = hall_schema(&engine)?;
    engine.register("hall", &schema)?;

    let engine = Arc::new(engine);
    let token = CancellationToken::new();
    let loop_handle = Arc::clone(&engine).listen(receiver, token.clone());

    // Scripted scenario: three button presses, the middle one while the
    // light is already on.
    for state in ["on", "off", "on"] {
        tokio::time::sleep(Duration::from_millis(700)).await;
        tracing::info!(state, "pressing hall button");
        button.set(state);
    }

    tracing::info!("scenario finished, waiting for ctrl-c");
    tokio::signal::ctrl_c().await?;

    token.cancel();
    loop_handle.await?;
    Ok(())
}

/// Demo rule set for the hall: the button toggles the light, and the
/// brightness picked for turn-on depends on the time of day.
fn hall_schema(engine: &Engine) -> anyhow::Result<EventSchema> {
    let light = engine.effectors().fetch("light", "light.hall")?;

    let light_for_conditions = light.clone();
    let light_is_on = Condition::property("hall_light_is_on", move || {
        light_for_conditions.state().state == "on"
    });
    let light_is_off = light_is_on.clone().invert();

    let is_night = Condition::new("is_night", |_| {
        use chrono::Timelike;
        let hour = chrono::Local::now().hour();
        !(6..23).contains(&hour)
    });

    let turn_off = fetch_action(&light, "turn_off")?;
    let turn_on = fetch_action(&light, "turn_on")?
        .with_kwarg(
            "brightness",
            is_night.choose(serde_json::json!(80), serde_json::json!(255)),
        )
        .then(Action::delay(Duration::from_millis(100)))?;

    let on_press = StateEvent::new("switch.hall_button").to_states(["on"])?;

    Ok(vec![(
        on_press,
        ActionSchema::Branches(vec![
            (light_is_on, ActionSchema::from(turn_off)),
            (light_is_off, ActionSchema::from(turn_on)),
        ]),
    )])
}

fn fetch_action(effector: &Arc<dyn Effector>, operation: &str) -> anyhow::Result<Action> {
    effector.action(operation).ok_or_else(|| {
        anyhow::anyhow!(
            "effector {} has no operation {operation}",
            effector.entity_id()
        )
    })
}
