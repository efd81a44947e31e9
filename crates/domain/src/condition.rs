//! Condition — boolean predicates over named arguments, composable with
//! AND / OR / NOT.
//!
//! A condition either declares a fixed set of argument names (evaluation
//! requires exactly those names, no more, no less) or is unconstrained
//! (`arguments` is `None`) and ignores whatever it is given. Composition
//! checks argument compatibility at construction time: two conditions with
//! different non-null argument sets cannot be combined.
//!
//! Inversion is a flag applied after evaluating the un-inverted form —
//! `(a & b).invert()` stays a single inverted AND node, it is never
//! expanded into `!a | !b`. Composing onto an uninverted group of the same
//! operator appends to that group instead of nesting; an inverted group on
//! the left always produces a fresh two-child group.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{ConditionArgumentMismatch, ConditionIncompatible, HomeScriptError};

/// Keyword arguments supplied to a condition at evaluation time.
pub type ArgMap = BTreeMap<String, serde_json::Value>;

/// Declared argument names; `None` accepts and ignores anything.
pub type ArgNames = Option<BTreeSet<String>>;

type Predicate = Arc<dyn Fn(&ArgMap) -> bool + Send + Sync>;

#[derive(Clone)]
enum ConditionKind {
    Func { predicate: Predicate },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

/// A boolean predicate over a fixed or unconstrained set of named inputs.
///
/// Immutable: composition returns new values and never mutates.
#[derive(Clone)]
pub struct Condition {
    name: String,
    arguments: ArgNames,
    inverted: bool,
    kind: ConditionKind,
}

impl Condition {
    /// An unconstrained atomic condition. The predicate is always called
    /// with an empty argument map; supplied keywords are ignored.
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&ArgMap) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arguments: None,
            inverted: false,
            kind: ConditionKind::Func {
                predicate: Arc::new(predicate),
            },
        }
    }

    /// An atomic condition requiring exactly the given argument names.
    pub fn with_arguments(
        name: impl Into<String>,
        arguments: &[&str],
        predicate: impl Fn(&ArgMap) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arguments: Some(arguments.iter().map(ToString::to_string).collect()),
            inverted: false,
            kind: ConditionKind::Func {
                predicate: Arc::new(predicate),
            },
        }
    }

    /// A condition reading a live value, e.g. an effector's on/off state.
    pub fn property(name: impl Into<String>, source: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self::new(name, move |_| source())
    }

    /// Declared argument names, if any.
    #[must_use]
    pub fn arguments(&self) -> &ArgNames {
        &self.arguments
    }

    /// Whether the result is negated after evaluation.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// `true` when this condition can be evaluated with exactly the given
    /// argument names. Unconstrained conditions accept anything.
    #[must_use]
    pub fn accepts_arguments(&self, arguments: &BTreeSet<String>) -> bool {
        match &self.arguments {
            None => true,
            Some(own) => own == arguments,
        }
    }

    /// Evaluate with the given keyword arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionArgumentMismatch`] when a fixed argument set is
    /// declared and the supplied names differ from it exactly.
    pub fn evaluate(&self, args: &ArgMap) -> Result<bool, HomeScriptError> {
        if let Some(expected) = &self.arguments {
            let supplied: BTreeSet<String> = args.keys().cloned().collect();
            if &supplied != expected {
                return Err(ConditionArgumentMismatch {
                    condition: self.to_string(),
                    expected: join_names(expected),
                    supplied: join_names(&supplied),
                }
                .into());
            }
        }
        Ok(self.run(args)? != self.inverted)
    }

    fn run(&self, args: &ArgMap) -> Result<bool, HomeScriptError> {
        match &self.kind {
            ConditionKind::Func { predicate } => {
                if self.arguments.is_none() {
                    // unconstrained predicates never see supplied keywords
                    Ok(predicate(&ArgMap::new()))
                } else {
                    Ok(predicate(args))
                }
            }
            ConditionKind::All(members) => {
                for member in members {
                    if !member.evaluate(args)? {
                        tracing::debug!(failed = %member, statement = %self, "AND short-circuit");
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionKind::Any(members) => {
                for member in members {
                    if member.evaluate(args)? {
                        return Ok(true);
                    }
                }
                tracing::debug!(statement = %self, "every OR branch failed");
                Ok(false)
            }
        }
    }

    /// Conjoin with another condition.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionIncompatible`] when both sides declare different
    /// non-null argument sets.
    pub fn and(self, other: Condition) -> Result<Condition, HomeScriptError> {
        self.compose(other, Operator::All)
    }

    /// Disjoin with another condition.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionIncompatible`] when both sides declare different
    /// non-null argument sets.
    pub fn or(self, other: Condition) -> Result<Condition, HomeScriptError> {
        self.compose(other, Operator::Any)
    }

    /// Negate. Only the flag flips; the structure is untouched.
    #[must_use]
    pub fn invert(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    /// Bind two values to this condition, producing one of them when the
    /// value is resolved at run time.
    pub fn choose<T>(self, true_case: T, false_case: T) -> ConditionValue<T> {
        ConditionValue {
            condition: self,
            true_case,
            false_case,
        }
    }

    fn compose(self, other: Condition, operator: Operator) -> Result<Condition, HomeScriptError> {
        // An uninverted group of the same operator absorbs the new member;
        // an inverted one falls back to a fresh two-child group.
        if !self.inverted && self.operator() == Some(operator) {
            let arguments = join_arguments(&self.arguments, &other.arguments);
            ensure_member(&arguments, &other)?;
            let mut members = self.into_members();
            members.push(other);
            return Ok(Condition::group(operator, arguments, members));
        }

        let arguments = join_arguments(&self.arguments, &other.arguments);
        ensure_member(&arguments, &self)?;
        ensure_member(&arguments, &other)?;
        Ok(Condition::group(operator, arguments, vec![self, other]))
    }

    fn operator(&self) -> Option<Operator> {
        match &self.kind {
            ConditionKind::All(_) => Some(Operator::All),
            ConditionKind::Any(_) => Some(Operator::Any),
            ConditionKind::Func { .. } => None,
        }
    }

    fn into_members(self) -> Vec<Condition> {
        match self.kind {
            ConditionKind::All(members) | ConditionKind::Any(members) => members,
            ConditionKind::Func { .. } => vec![self],
        }
    }

    fn group(operator: Operator, arguments: ArgNames, members: Vec<Condition>) -> Condition {
        let kind = match operator {
            Operator::All => ConditionKind::All(members),
            Operator::Any => ConditionKind::Any(members),
        };
        Condition {
            name: String::new(),
            arguments,
            inverted: false,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    All,
    Any,
}

/// The composite adopts the first defined argument set.
fn join_arguments(left: &ArgNames, right: &ArgNames) -> ArgNames {
    if left.is_some() {
        left.clone()
    } else {
        right.clone()
    }
}

/// A member must be unconstrained or declare exactly the group's set.
fn ensure_member(arguments: &ArgNames, member: &Condition) -> Result<(), ConditionIncompatible> {
    let compatible = match (&member.arguments, arguments) {
        (None, _) => true,
        (Some(own), Some(group)) => own == group,
        (Some(_), None) => false,
    };
    if compatible {
        Ok(())
    } else {
        Err(ConditionIncompatible {
            left: member.to_string(),
            right: match arguments {
                Some(names) => format!("arguments [{}]", join_names(names)),
                None => "unconstrained arguments".to_string(),
            },
        })
    }
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}

impl std::ops::Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        self.invert()
    }
}

impl PartialEq for Condition {
    /// Structural equality; atomic predicates compare by pointer identity,
    /// so a clone equals its source but two independently built conditions
    /// never compare equal.
    fn eq(&self, other: &Self) -> bool {
        if self.inverted != other.inverted || self.arguments != other.arguments {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                ConditionKind::Func { predicate: left },
                ConditionKind::Func { predicate: right },
            ) => Arc::ptr_eq(left, right),
            (ConditionKind::All(left), ConditionKind::All(right))
            | (ConditionKind::Any(left), ConditionKind::Any(right)) => left == right,
            _ => false,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.inverted { "NOT " } else { "" };
        match &self.kind {
            ConditionKind::Func { .. } => write!(f, "{prefix}{}", self.name),
            ConditionKind::All(members) => {
                write!(f, "{prefix}({})", join_members(members, " AND "))
            }
            ConditionKind::Any(members) => {
                write!(f, "{prefix}({})", join_members(members, " OR "))
            }
        }
    }
}

fn join_members(members: &[Condition], separator: &str) -> String {
    members
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({self})")
    }
}

/// A ternary chooser bound to a condition: resolves to `true_case` or
/// `false_case` when an action materializes its arguments, never earlier.
#[derive(Clone)]
pub struct ConditionValue<T> {
    condition: Condition,
    true_case: T,
    false_case: T,
}

impl<T> ConditionValue<T> {
    /// Pair two outcomes with a condition.
    pub fn new(condition: Condition, true_case: T, false_case: T) -> Self {
        Self {
            condition,
            true_case,
            false_case,
        }
    }

    /// Evaluate the bound condition and pick an outcome.
    ///
    /// The condition is evaluated with no arguments, so only unconstrained
    /// conditions can back a conditional value.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionArgumentMismatch`] when the bound condition
    /// declares a fixed argument set.
    pub fn resolve(&self) -> Result<&T, HomeScriptError> {
        if self.condition.evaluate(&ArgMap::new())? {
            Ok(&self.true_case)
        } else {
            Ok(&self.false_case)
        }
    }
}

impl<T: fmt::Display> fmt::Display for ConditionValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} if {} else {}",
            self.true_case, self.condition, self.false_case
        )
    }
}

impl<T: fmt::Display> fmt::Debug for ConditionValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{self}>")
    }
}
