//! Effector registry — typed lookup of host objects by domain and entity.

use std::collections::HashMap;
use std::sync::Arc;

use homescript_domain::error::{EffectorNotFound, HomeScriptError};

use crate::ports::Effector;

/// Registry of the effectors rule authors can bind actions to.
///
/// Populated during setup, read-only afterwards.
#[derive(Default)]
pub struct EffectorRegistry {
    effectors: HashMap<(String, String), Arc<dyn Effector>>,
}

impl EffectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an effector under its own domain and entity id.
    pub fn register(&mut self, effector: Arc<dyn Effector>) {
        let key = (
            effector.domain().to_string(),
            effector.entity_id().to_string(),
        );
        tracing::debug!(domain = key.0, entity_id = key.1, "registering effector");
        self.effectors.insert(key, effector);
    }

    /// Fetch the effector for `entity_id` within `domain`.
    ///
    /// # Errors
    ///
    /// Returns [`EffectorNotFound`] when nothing is registered under the
    /// pair; the known domains are logged to help diagnose typos.
    pub fn fetch(
        &self,
        domain: &str,
        entity_id: &str,
    ) -> Result<Arc<dyn Effector>, HomeScriptError> {
        let key = (domain.to_string(), entity_id.to_string());
        self.effectors.get(&key).cloned().ok_or_else(|| {
            let mut known: Vec<&str> = self
                .effectors
                .keys()
                .map(|(domain, _)| domain.as_str())
                .collect();
            known.sort_unstable();
            known.dedup();
            tracing::debug!(
                domain,
                entity_id,
                known = known.join(", "),
                "effector lookup failed"
            );
            EffectorNotFound {
                domain: domain.to_string(),
                entity_id: entity_id.to_string(),
            }
            .into()
        })
    }

    /// Number of registered effectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.effectors.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effectors.is_empty()
    }
}
