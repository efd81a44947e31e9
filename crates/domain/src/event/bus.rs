//! Bus event — a host event identified by type only.

use std::collections::BTreeSet;
use std::fmt;

use crate::condition::{ArgMap, Condition};
use crate::error::{ConditionIncompatible, HomeScriptError};

/// Argument names a bus-event filter is evaluated with.
pub const BUS_EVENT_ARGS: [&str; 1] = ["event"];

/// A host bus event of a given type, optionally narrowed by a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    event_type: String,
    condition: Option<Condition>,
}

impl BusEvent {
    /// Describe all bus events of the given type.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            condition: None,
        }
    }

    /// The event type this descriptor matches.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
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
    /// argument set other than [`BUS_EVENT_ARGS`].
    pub fn with(self, condition: Condition) -> Result<Self, HomeScriptError> {
        ensure_bus_filter(&condition, &self)?;
        let condition = match self.condition {
            None => condition,
            Some(existing) => existing.and(condition)?,
        };
        Ok(Self {
            event_type: self.event_type,
            condition: Some(condition),
        })
    }

    /// Evaluate the attached filter against a bus payload. An
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
}

fn ensure_bus_filter(condition: &Condition, event: &BusEvent) -> Result<(), ConditionIncompatible> {
    let fixed: BTreeSet<String> = BUS_EVENT_ARGS.iter().map(ToString::to_string).collect();
    if condition.accepts_arguments(&fixed) {
        Ok(())
    } else {
        Err(ConditionIncompatible {
            left: condition.to_string(),
            right: event.to_string(),
        })
    }
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus event {}", self.event_type)?;
        if let Some(condition) = &self.condition {
            write!(f, " with filter {condition}")?;
        }
        Ok(())
    }
}

/// A condition over the bus-event argument set.
pub fn bus_condition(
    name: impl Into<String>,
    predicate: impl Fn(&ArgMap) -> bool + Send + Sync + 'static,
) -> Condition {
    Condition::with_arguments(name, &BUS_EVENT_ARGS, predicate)
}
