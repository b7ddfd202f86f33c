// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Source registry - owns the configured sources and their last readings

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::{MonitoredSource, SourceDefinition, SourceId};
use crate::error::{ConfigError, UnknownSource};

/// Membership change of the subscription set after a reload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    /// Newly subscribed identities
    pub added: BTreeSet<SourceId>,
    /// Identities to drop
    pub removed: BTreeSet<SourceId>,
}

impl SubscriptionDiff {
    /// Diff from `before` to `after`
    pub fn between(before: &BTreeSet<SourceId>, after: &BTreeSet<SourceId>) -> Self {
        Self {
            added: after.difference(before).copied().collect(),
            removed: before.difference(after).copied().collect(),
        }
    }

    /// Diff that subscribes everything in `set`, used for the first attach
    pub fn initial(set: BTreeSet<SourceId>) -> Self {
        Self {
            added: set,
            removed: BTreeSet::new(),
        }
    }

    /// True when nothing changes
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Rejects zero and duplicate identities
pub fn validate_definitions(defs: &[SourceDefinition]) -> Result<(), ConfigError> {
    let mut seen = HashSet::with_capacity(defs.len());
    for def in defs {
        if !def.id.is_valid() {
            return Err(ConfigError::InvalidSourceId {
                name: def.name.clone(),
            });
        }
        if !seen.insert(def.id) {
            return Err(ConfigError::DuplicateSource(def.id));
        }
    }
    Ok(())
}

/// Configured sources with their last readings
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<MonitoredSource>,
    index: HashMap<SourceId, usize>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole source set. Sources present before and after keep
    /// their last reading. Nothing changes when validation fails.
    pub fn load(&mut self, defs: &[SourceDefinition]) -> Result<SubscriptionDiff, ConfigError> {
        validate_definitions(defs)?;

        let before = self.subscriptions();

        let mut sources = Vec::with_capacity(defs.len());
        let mut index = HashMap::with_capacity(defs.len());
        for (position, def) in defs.iter().enumerate() {
            let last_value = self.get(def.id).and_then(|s| s.last_value);
            sources.push(MonitoredSource::from_definition(def, last_value));
            index.insert(def.id, position);
        }

        self.sources = sources;
        self.index = index;

        let diff = SubscriptionDiff::between(&before, &self.subscriptions());
        debug!(
            "Loaded {} sources (+{} / -{} subscriptions)",
            self.sources.len(),
            diff.added.len(),
            diff.removed.len()
        );
        Ok(diff)
    }

    /// Source by identity
    pub fn get(&self, id: SourceId) -> Option<&MonitoredSource> {
        self.index.get(&id).map(|&i| &self.sources[i])
    }

    /// Sources in configuration order
    pub fn all(&self) -> &[MonitoredSource] {
        &self.sources
    }

    /// Identities an update source must deliver: the enabled sources
    pub fn subscriptions(&self) -> BTreeSet<SourceId> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.id)
            .collect()
    }

    /// Store a reading and return the one it replaced
    pub(crate) fn record(&mut self, id: SourceId, value: bool) -> Result<Option<bool>, UnknownSource> {
        let position = *self.index.get(&id).ok_or(UnknownSource(id))?;
        Ok(self.sources[position].last_value.replace(value))
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when no sources are configured
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
