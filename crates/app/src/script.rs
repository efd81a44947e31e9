//! Script execution context — a named, single-flight task holder.
//!
//! A script owns the units of work launched on its behalf. Only one
//! action set is meant to be in flight per script: the dispatcher cancels
//! everything a script is running before handing it a new set.
//! Cancellation is cooperative — a unit of work stops at its next
//! suspension point, and a synchronous action, once started, runs to
//! completion.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use homescript_domain::action::Action;

/// Cheap-clone handle to a named execution context.
#[derive(Clone)]
pub struct Script {
    inner: Arc<ScriptInner>,
}

struct ScriptInner {
    name: String,
    tasks: Mutex<HashMap<u64, CancellationToken>>,
    next_task: AtomicU64,
    stopped: AtomicBool,
}

impl ScriptInner {
    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Script {
    /// Create a fresh, running context.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScriptInner {
                name: name.into(),
                tasks: Mutex::new(HashMap::new()),
                next_task: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// The script's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Number of units of work currently recorded for this script.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.inner.lock_tasks().len()
    }

    /// Execute an action on behalf of this script.
    ///
    /// A stopped script ignores the request (logging the skip). An
    /// asynchronous action is spawned as a cancellable unit of work; a
    /// synchronous one runs inline on the calling thread. Failures are
    /// logged with full context and never propagate to the caller;
    /// cancellation mid-flight is swallowed silently.
    pub fn run_action(&self, action: &Action) {
        if self.is_stopped() {
            tracing::debug!(script = %self, action = %action, "script is stopped, skipping");
            return;
        }
        tracing::debug!(script = %self, action = %action, "running action");
        if action.is_async() {
            self.spawn(action.clone());
        } else {
            tracing::info!(script = self.inner.name, action = %action, "run");
            if let Err(error) = action.run() {
                tracing::error!(script = self.inner.name, action = %action, %error, "action failed");
            }
        }
    }

    fn spawn(&self, action: Action) {
        let id = self.inner.next_task.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        self.inner.lock_tasks().insert(id, token.clone());

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tracing::info!(script = inner.name, action = %action, "run async task");
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(script = inner.name, action = %action, "task was cancelled");
                }
                result = action.run_async() => match result {
                    Ok(()) => tracing::debug!(script = inner.name, action = %action, "task finished"),
                    Err(error) => {
                        tracing::error!(script = inner.name, action = %action, %error, "action failed");
                    }
                }
            }
            // the unit removes itself whatever the outcome
            inner.lock_tasks().remove(&id);
        });
    }

    /// Request cancellation of every recorded unit of work. Does not
    /// block for completion; each unit removes itself when it winds down.
    pub fn cancel_all_tasks(&self) {
        let tasks = self.inner.lock_tasks();
        if !tasks.is_empty() {
            tracing::debug!(script = self.inner.name, tasks = tasks.len(), "cancelling tasks");
        }
        for token in tasks.values() {
            token.cancel();
        }
    }

    /// Stop accepting actions, then cancel everything in flight. There is
    /// no way back: reloading rules creates a fresh context.
    pub fn stop(&self) {
        tracing::debug!(script = %self, "stopping");
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.cancel_all_tasks();
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script {}", self.inner.name)?;
        if self.is_stopped() {
            f.write_str(" stopped")?;
        }
        let running = self.running_tasks();
        if running > 0 {
            write!(f, " with {running} running tasks")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Lazily creates scripts by name and stops them all on unload.
#[derive(Debug, Default)]
pub struct ScriptManager {
    scripts: HashMap<String, Script>,
}

impl ScriptManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The script registered under `name`, created on first reference.
    pub fn get_or_create(&mut self, name: &str) -> Script {
        self.scripts
            .entry(name.to_string())
            .or_insert_with(|| Script::new(name))
            .clone()
    }

    /// The script registered under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Script> {
        self.scripts.get(name)
    }

    /// Stop every script.
    pub fn stop_all(&self) {
        tracing::info!("stopping all scripts");
        for script in self.scripts.values() {
            script.stop();
        }
    }
}
