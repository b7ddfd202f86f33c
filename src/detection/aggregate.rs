// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Aggregate status engine - overall OK/Alarm plus the per-source overview

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sources::{MonitoredSource, SourceId, SourceRegistry};

/// Overall status shown on the status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverallStatus {
    /// No enabled source reports sabotage
    Ok,
    /// At least one enabled source reports sabotage
    Alarm,
}

impl OverallStatus {
    /// True for `Alarm`
    pub fn is_alarm(self) -> bool {
        self == OverallStatus::Alarm
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Ok => write!(f, "OK"),
            OverallStatus::Alarm => write!(f, "Alarm"),
        }
    }
}

/// Per-source state as rendered in the overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceState {
    /// Last reading was `false`
    Ok,
    /// Last reading was `true`
    Tampered,
    /// No reading received yet
    NoData,
}

impl From<Option<bool>> for SourceState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => SourceState::Tampered,
            Some(false) => SourceState::Ok,
            None => SourceState::NoData,
        }
    }
}

/// One overview line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewRow {
    /// Source identity
    pub source_id: SourceId,
    /// Source label
    pub display_name: String,
    /// Device label
    pub parent_name: String,
    /// Disabled rows never affect the overall status
    pub enabled: bool,
    /// Last reading
    pub state: SourceState,
}

impl From<&MonitoredSource> for OverviewRow {
    fn from(source: &MonitoredSource) -> Self {
        Self {
            source_id: source.id,
            display_name: source.display_name.clone(),
            parent_name: source.parent_name.clone(),
            enabled: source.enabled,
            state: source.last_value.into(),
        }
    }
}

/// Complete result of one recomputation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStatus {
    /// OK unless an enabled source reports sabotage
    pub overall: OverallStatus,
    /// Rows in configuration order
    pub overview: Vec<OverviewRow>,
    /// When the status was computed
    pub computed_at: DateTime<Utc>,
    /// Overview display is switched off. Rows are still computed and
    /// published; hosts decide whether to show them.
    #[serde(default)]
    pub hidden: bool,
}

impl AggregateStatus {
    /// Status before any recomputation
    pub fn empty() -> Self {
        Self {
            overall: OverallStatus::Ok,
            overview: Vec::new(),
            computed_at: Utc::now(),
            hidden: false,
        }
    }

    /// Enabled rows currently reporting tamper
    pub fn tampered(&self) -> impl Iterator<Item = &OverviewRow> {
        self.overview
            .iter()
            .filter(|row| row.enabled && row.state == SourceState::Tampered)
    }

    /// Enabled rows that have never reported
    pub fn silent(&self) -> impl Iterator<Item = &OverviewRow> {
        self.overview
            .iter()
            .filter(|row| row.enabled && row.state == SourceState::NoData)
    }
}

/// Recompute status from the registry's last readings.
///
/// Unknown readings count as OK for the overall status but keep their own
/// `NoData` state in the overview. Disabled sources are listed without
/// contributing.
pub fn recompute(registry: &SourceRegistry) -> AggregateStatus {
    let mut overall = OverallStatus::Ok;
    let mut overview = Vec::with_capacity(registry.len());

    for source in registry.all() {
        if source.enabled && source.last_value == Some(true) {
            overall = OverallStatus::Alarm;
        }
        overview.push(OverviewRow::from(source));
    }

    AggregateStatus {
        overall,
        overview,
        computed_at: Utc::now(),
        hidden: false,
    }
}
