//! In-memory registry of loaded models.

use crate::family::{ModelFamily, ModelKind};
use district_features::FeatureScaler;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Model, scaler and readiness of one family.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegistryEntry {
    pub model: Option<ModelFamily>,
    pub scaler: Option<FeatureScaler>,
    pub ready: bool,
}

/// One entry per family, owned by a single manager.
///
/// Writers replace a whole entry at once; readers hold the read lock only
/// for the duration of one inference.
#[derive(Debug)]
pub(crate) struct ModelRegistry {
    entries: RwLock<HashMap<ModelKind, RegistryEntry>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let entries = ModelKind::ALL
            .into_iter()
            .map(|kind| (kind, RegistryEntry::default()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn is_ready(&self, kind: ModelKind) -> bool {
        self.entries.read().get(&kind).map(|e| e.ready).unwrap_or(false)
    }

    pub fn all_ready(&self) -> bool {
        ModelKind::ALL.into_iter().all(|kind| self.is_ready(kind))
    }

    /// Publishes a model and its scaler and marks the family ready.
    pub fn install(&self, model: ModelFamily, scaler: FeatureScaler) {
        let kind = model.kind();
        self.entries.write().insert(
            kind,
            RegistryEntry {
                model: Some(model),
                scaler: Some(scaler),
                ready: true,
            },
        );
    }

    /// Runs `f` against a ready family under the read lock.
    ///
    /// Returns `None` when the family is not ready.
    pub fn with_ready<R>(&self, kind: ModelKind, f: impl FnOnce(&ModelFamily, &FeatureScaler) -> R) -> Option<R> {
        let entries = self.entries.read();
        let entry = entries.get(&kind).filter(|e| e.ready)?;
        match (&entry.model, &entry.scaler) {
            (Some(model), Some(scaler)) => Some(f(model, scaler)),
            _ => None,
        }
    }
}
