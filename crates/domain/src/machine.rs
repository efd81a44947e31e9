//! Declarative state graph — named states compiled into an event schema.
//!
//! Instead of wiring events to actions directly, authors can describe
//! *states*: a name, a condition that characterizes the state, optional
//! side-effect actions, and how the state is reached — either activated
//! directly by events, affected by events (each conjoined with the
//! state's condition), or derived from other states (inheriting the base
//! states' events, each guarded by the sibling bases' conditions).
//! [`StateGraph::build_event_schema`] resolves the graph in dependency
//! order and emits a regular [`EventSchema`] for registration.

use std::collections::BTreeMap;
use std::fmt;

use crate::action::Action;
use crate::condition::Condition;
use crate::error::{HomeScriptError, InvalidState};
use crate::event::StateEvent;
use crate::schema::{ActionSchema, EventSchema};

#[derive(Debug, Clone)]
enum Activation {
    /// Events that activate the state as-is.
    ActivatedBy(Vec<StateEvent>),
    /// Events that may change the state; each is narrowed by the state's
    /// own condition.
    AffectedBy(Vec<StateEvent>),
    /// Alternative sets of base states the state is derived from.
    DependsOn(Vec<Vec<State>>),
}

/// A named state with a characterizing condition and optional
/// side effects.
#[derive(Debug, Clone)]
pub struct State {
    name: String,
    condition: Condition,
    side_effects: Vec<Action>,
    activation: Activation,
}

impl State {
    /// Start building a state.
    #[must_use]
    pub fn builder() -> StateBuilder {
        StateBuilder::default()
    }

    /// The state's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The condition characterizing the state.
    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Actions run when the state is entered.
    #[must_use]
    pub fn side_effects(&self) -> &[Action] {
        &self.side_effects
    }

    /// The negated state: same activation sources, inverted condition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidState`] when the state carries side effects —
    /// negating those has no meaning.
    pub fn invert(self) -> Result<State, HomeScriptError> {
        if !self.side_effects.is_empty() {
            return Err(InvalidState {
                state: self.name,
                reason: "only states without side effects can be inverted".to_string(),
            }
            .into());
        }
        Ok(State {
            name: format!("NOT {}", self.name),
            condition: self.condition.invert(),
            side_effects: self.side_effects,
            activation: self.activation,
        })
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}#", self.name)
    }
}

/// Step-by-step builder for [`State`].
#[derive(Debug, Default)]
pub struct StateBuilder {
    name: Option<String>,
    condition: Option<Condition>,
    side_effects: Vec<Action>,
    activated_by: Vec<StateEvent>,
    affected_by: Vec<StateEvent>,
    depends_on: Vec<Vec<State>>,
}

impl StateBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn side_effect(mut self, action: Action) -> Self {
        self.side_effects.push(action);
        self
    }

    #[must_use]
    pub fn activated_by(mut self, event: StateEvent) -> Self {
        self.activated_by.push(event);
        self
    }

    #[must_use]
    pub fn affected_by(mut self, event: StateEvent) -> Self {
        self.affected_by.push(event);
        self
    }

    #[must_use]
    pub fn depends_on(mut self, bases: impl IntoIterator<Item = State>) -> Self {
        self.depends_on.push(bases.into_iter().collect());
        self
    }

    /// Consume the builder and validate the state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidState`] when the name or condition is missing, or
    /// when the state declares no — or more than one — activation source.
    pub fn build(self) -> Result<State, HomeScriptError> {
        let name = self.name.unwrap_or_default();
        if name.is_empty() {
            return Err(InvalidState {
                state: "<unnamed>".to_string(),
                reason: "a state needs a name".to_string(),
            }
            .into());
        }
        let Some(condition) = self.condition else {
            return Err(InvalidState {
                state: name,
                reason: "a state needs a condition".to_string(),
            }
            .into());
        };
        let sources = [
            !self.activated_by.is_empty(),
            !self.affected_by.is_empty(),
            !self.depends_on.is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if sources != 1 {
            return Err(InvalidState {
                state: name,
                reason: "exactly one of activated_by, affected_by or depends_on is required"
                    .to_string(),
            }
            .into());
        }
        let activation = if !self.activated_by.is_empty() {
            Activation::ActivatedBy(self.activated_by)
        } else if !self.affected_by.is_empty() {
            Activation::AffectedBy(self.affected_by)
        } else {
            Activation::DependsOn(self.depends_on)
        };
        Ok(State {
            name,
            condition,
            side_effects: self.side_effects,
            activation,
        })
    }
}

/// Explicit registry of states, resolved into an event schema on demand.
#[derive(Debug, Default)]
pub struct StateGraph {
    states: Vec<State>,
}

impl StateGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidState`] when a state with the same name exists.
    pub fn add(&mut self, state: State) -> Result<(), HomeScriptError> {
        if self.states.iter().any(|known| known.name == state.name) {
            return Err(InvalidState {
                state: state.name,
                reason: "a state with this name is already registered".to_string(),
            }
            .into());
        }
        tracing::debug!(state = %state, "adding state");
        self.states.push(state);
        Ok(())
    }

    /// Compile the graph into an event schema. With `filter` given, only
    /// the named states contribute side effects (all states still take
    /// part in resolution).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidState`] when some states' event sources cannot be
    /// resolved (missing or cyclic dependencies), or any event-composition
    /// error from narrowing.
    pub fn build_event_schema(
        &self,
        filter: Option<&[&str]>,
    ) -> Result<EventSchema, HomeScriptError> {
        let events = self.resolve_events()?;
        let mut schema: EventSchema = Vec::new();
        for state in &self.states {
            if state.side_effects.is_empty() {
                continue;
            }
            if let Some(names) = filter
                && !names.contains(&state.name.as_str())
            {
                tracing::debug!(state = %state, "filtered out");
                continue;
            }
            for event in &events[&state.name] {
                // the graph only ever emits leaves, so merging stays flat
                if let Some((_, ActionSchema::Leaf(actions))) =
                    schema.iter_mut().find(|(existing, _)| existing == event)
                {
                    actions.extend(state.side_effects.iter().cloned());
                } else {
                    schema
                        .push((event.clone(), ActionSchema::Leaf(state.side_effects.clone())));
                }
            }
        }
        Ok(schema)
    }

    /// Map every state name to the events that lead into it, resolving
    /// dependent states only once their bases are known.
    fn resolve_events(&self) -> Result<BTreeMap<String, Vec<StateEvent>>, HomeScriptError> {
        let mut resolved: BTreeMap<String, Vec<StateEvent>> = BTreeMap::new();
        let mut pending: Vec<&State> = self.states.iter().collect();
        while !pending.is_empty() {
            let mut remaining = Vec::new();
            let mut progressed = false;
            for state in pending {
                match Self::try_resolve(state, &resolved)? {
                    Some(events) => {
                        tracing::debug!(state = %state, events = events.len(), "resolved");
                        resolved.insert(state.name.clone(), events);
                        progressed = true;
                    }
                    None => remaining.push(state),
                }
            }
            if !progressed {
                let names = remaining
                    .iter()
                    .map(|state| state.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(InvalidState {
                    state: names,
                    reason: "event sources cannot be resolved".to_string(),
                }
                .into());
            }
            pending = remaining;
        }
        Ok(resolved)
    }

    fn try_resolve(
        state: &State,
        resolved: &BTreeMap<String, Vec<StateEvent>>,
    ) -> Result<Option<Vec<StateEvent>>, HomeScriptError> {
        match &state.activation {
            Activation::ActivatedBy(events) => Ok(Some(events.clone())),
            Activation::AffectedBy(events) => {
                let narrowed = events
                    .iter()
                    .map(|event| event.clone().with(state.condition.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(narrowed))
            }
            Activation::DependsOn(sets) => {
                let ready = sets
                    .iter()
                    .flatten()
                    .all(|base| resolved.contains_key(&base.name));
                if !ready {
                    return Ok(None);
                }
                let mut all = Vec::new();
                for bases in sets {
                    for (index, base) in bases.iter().enumerate() {
                        let guard = Self::sibling_guard(bases, index)?;
                        for event in &resolved[&base.name] {
                            let event = match &guard {
                                None => event.clone(),
                                Some(guard) => event.clone().with(guard.clone())?,
                            };
                            all.push(event);
                        }
                    }
                }
                Ok(Some(all))
            }
        }
    }

    /// Conjunction of every base condition except the one at `index`.
    fn sibling_guard(
        bases: &[State],
        index: usize,
    ) -> Result<Option<Condition>, HomeScriptError> {
        let mut guard: Option<Condition> = None;
        for (position, base) in bases.iter().enumerate() {
            if position == index {
                continue;
            }
            guard = Some(match guard {
                None => base.condition.clone(),
                Some(existing) => existing.and(base.condition.clone())?,
            });
        }
        Ok(guard)
    }
}
