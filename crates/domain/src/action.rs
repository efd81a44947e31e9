//! Action — a bound, possibly sequenced unit of executable work.
//!
//! An [`Action`] holds one or more [`Function`]s plus the positional and
//! keyword arguments they will be called with. Actions are immutable:
//! [`Action::call`] returns a new value with additional arguments,
//! [`Action::then`] returns a new left-to-right sequence. Conditional
//! argument values ([`ConditionValue`]) stay unresolved until the moment a
//! function is actually invoked.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::condition::ConditionValue;
use crate::error::{ArgumentsIncompatible, HomeScriptError, InvalidSequence};

/// Future returned by an asynchronous function body.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<(), HomeScriptError>> + Send>>;

type SyncBody = Arc<dyn Fn(CallArgs) -> Result<(), HomeScriptError> + Send + Sync>;
type AsyncBody = Arc<dyn Fn(CallArgs) -> BoxFuture + Send + Sync>;

/// Arguments materialized for one function invocation: positional values
/// in declaration order, keyword values for the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<serde_json::Value>,
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

impl CallArgs {
    /// Look up the parameter at `index` named `name`, whichever way it was
    /// supplied.
    #[must_use]
    pub fn param(&self, index: usize, name: &str) -> Option<&serde_json::Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }
}

#[derive(Clone)]
enum FunctionBody {
    Sync(SyncBody),
    Async(AsyncBody),
}

/// A callable with declared parameter names.
///
/// The owning object, when there is one, is captured inside the body when
/// the function is built (adapters do this once at construction), so no
/// implicit instance argument exists at call time.
#[derive(Clone)]
pub struct Function {
    name: String,
    params: Vec<String>,
    body: FunctionBody,
}

impl Function {
    /// A synchronous function.
    pub fn sync(
        name: impl Into<String>,
        params: &[&str],
        body: impl Fn(CallArgs) -> Result<(), HomeScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(ToString::to_string).collect(),
            body: FunctionBody::Sync(Arc::new(body)),
        }
    }

    /// An asynchronous function; the closure produces a fresh future per
    /// invocation.
    pub fn future<F, Fut>(name: impl Into<String>, params: &[&str], body: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HomeScriptError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params: params.iter().map(ToString::to_string).collect(),
            body: FunctionBody::Async(Arc::new(move |call| Box::pin(body(call)))),
        }
    }

    /// Function name used in errors and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter names, in order.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Whether invoking this function requires awaiting.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.body, FunctionBody::Async(_))
    }

    /// Name-level validation of an action's bound arguments against this
    /// function, without resolving conditional values.
    fn validate_args(&self, action: &Action) -> Result<(), ArgumentsIncompatible> {
        if action.args.len() > self.params.len() {
            return Err(ArgumentsIncompatible {
                function: self.name.clone(),
                reason: format!(
                    "takes {} positional arguments, {} supplied",
                    self.params.len(),
                    action.args.len()
                ),
            });
        }
        let missing: Vec<&str> = self.params[action.args.len()..]
            .iter()
            .filter(|param| !action.kwargs.contains_key(*param))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ArgumentsIncompatible {
                function: self.name.clone(),
                reason: format!("missing arguments: {}", missing.join(", ")),
            })
        }
    }

    /// Materialize the arguments for one invocation, resolving conditional
    /// values. Keyword arguments not declared by this function are left for
    /// the other functions in the sequence.
    fn materialize_args(&self, action: &Action) -> Result<CallArgs, HomeScriptError> {
        self.validate_args(action)?;
        let args = action
            .args
            .iter()
            .map(ArgValue::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        let mut kwargs = BTreeMap::new();
        for param in &self.params[args.len()..] {
            kwargs.insert(param.clone(), action.kwargs[param].resolve()?);
        }
        Ok(CallArgs { args, kwargs })
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_async() { "async " } else { "" };
        write!(f, "Function({prefix}{})", self.name)
    }
}

/// A bound argument value: either a plain JSON value or a conditional one
/// resolved when the action runs.
#[derive(Clone)]
pub enum ArgValue {
    Plain(serde_json::Value),
    Conditional(ConditionValue<serde_json::Value>),
}

impl ArgValue {
    fn resolve(&self) -> Result<serde_json::Value, HomeScriptError> {
        match self {
            Self::Plain(value) => Ok(value.clone()),
            Self::Conditional(value) => value.resolve().cloned(),
        }
    }
}

impl From<serde_json::Value> for ArgValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Plain(value)
    }
}

impl From<ConditionValue<serde_json::Value>> for ArgValue {
    fn from(value: ConditionValue<serde_json::Value>) -> Self {
        Self::Conditional(value)
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => value.fmt(f),
            Self::Conditional(value) => value.fmt(f),
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// One or more functions with bound arguments, executed in order.
#[derive(Clone)]
pub struct Action {
    functions: Vec<Function>,
    args: Vec<ArgValue>,
    kwargs: BTreeMap<String, ArgValue>,
}

impl Action {
    /// Wrap a single function with no bound arguments.
    #[must_use]
    pub fn new(function: Function) -> Self {
        Self {
            functions: vec![function],
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// An asynchronous action waiting out the given duration.
    #[must_use]
    pub fn delay(duration: Duration) -> Self {
        Self::new(Function::future(
            format!("sleep[{}ms]", duration.as_millis()),
            &[],
            move |_| async move {
                tokio::time::sleep(duration).await;
                Ok(())
            },
        ))
    }

    /// Bind additional arguments, returning a new action. Positional
    /// arguments are appended; keyword arguments override existing names.
    #[must_use]
    pub fn call<A, K, N>(&self, args: A, kwargs: K) -> Self
    where
        A: IntoIterator<Item = ArgValue>,
        K: IntoIterator<Item = (N, ArgValue)>,
        N: Into<String>,
    {
        let mut next = self.clone();
        next.args.extend(args);
        next.kwargs
            .extend(kwargs.into_iter().map(|(name, value)| (name.into(), value)));
        next
    }

    /// Bind one keyword argument.
    #[must_use]
    pub fn with_kwarg(&self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.call([], [(name.into(), value.into())])
    }

    /// Whether any contained function is asynchronous.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.functions.iter().any(Function::is_async)
    }

    /// Validate that the bound arguments satisfy every function in the
    /// sequence. Called once at registration time so mis-wired rules fail
    /// fast instead of at trigger time.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentsIncompatible`] naming the offending function and
    /// the missing or excess parameters.
    pub fn check(&self) -> Result<(), HomeScriptError> {
        for function in &self.functions {
            function.validate_args(self)?;
        }
        Ok(())
    }

    /// Execute synchronously, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`HomeScriptError::AsyncActionRun`] when any function is
    /// asynchronous, or the first function failure.
    pub fn run(&self) -> Result<(), HomeScriptError> {
        for function in &self.functions {
            if function.is_async() {
                return Err(HomeScriptError::AsyncActionRun {
                    action: self.to_string(),
                });
            }
        }
        for function in &self.functions {
            let call = function.materialize_args(self)?;
            if let FunctionBody::Sync(body) = &function.body {
                body(call)?;
            }
        }
        Ok(())
    }

    /// Execute in sequence order, awaiting asynchronous functions and
    /// running synchronous ones inline. Conditional argument values are
    /// resolved immediately before each function's invocation.
    ///
    /// # Errors
    ///
    /// Returns the first argument-resolution or function failure.
    pub async fn run_async(&self) -> Result<(), HomeScriptError> {
        for function in &self.functions {
            let call = function.materialize_args(self)?;
            match &function.body {
                FunctionBody::Sync(body) => body(call)?,
                FunctionBody::Async(body) => body(call).await?,
            }
        }
        Ok(())
    }

    /// Join with another action, left-to-right. The right action must hold
    /// no positional arguments and no keyword names already bound on the
    /// left; the result keeps the left's arguments.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSequence`] when the right action violates either
    /// constraint.
    pub fn then(self, other: Action) -> Result<Action, HomeScriptError> {
        if !other.args.is_empty() {
            return Err(InvalidSequence {
                reason: format!("{other} joins a sequence with positional arguments"),
            }
            .into());
        }
        let common: Vec<&str> = self
            .kwargs
            .keys()
            .filter(|name| other.kwargs.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !common.is_empty() {
            return Err(InvalidSequence {
                reason: format!("actions share keyword arguments: {}", common.join(", ")),
            }
            .into());
        }
        let mut functions = self.functions;
        functions.extend(other.functions);
        // only the left side's bindings survive; the right contributes
        // its functions and nothing else
        Ok(Action {
            functions,
            args: self.args,
            kwargs: self.kwargs,
        })
    }

    /// Contained functions, in execution order.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_async() { "async " } else { "" };
        let names = self
            .functions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        let mut parts: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        parts.extend(
            self.kwargs
                .iter()
                .map(|(name, value)| format!("{name}={value}")),
        );
        write!(f, "{prefix}action {names}({})", parts.join(", "))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
