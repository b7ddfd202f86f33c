// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! TamperWatch - Tamper and Sabotage Monitoring Service
//!
//! Watches a set of tamper/sabotage sensor states and escalates when one
//! of them raises an alarm while monitoring is armed:
//! - Edge-triggered alarm detection (only a fresh `true` escalates)
//! - OK/Alarm aggregate status plus a per-source overview
//! - Ordered escalation: notification, siren, light, call
//! - Script, webhook and MQTT escalation targets
//! - Monitoring toggle and escalation history persisted in SQLite
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     TamperWatch Service                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌────────────┐   ┌───────────┐   ┌─────────┐  │
//! │  │ Ingest  │ → │  Monitor   │ → │ Detection │ → │Escalate │  │
//! │  │MQTT/line│   │  Service   │   │edge/aggr. │   │pipeline │  │
//! │  └─────────┘   └────────────┘   └───────────┘   └─────────┘  │
//! │                      ↓                               ↓       │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                       Event Bus                        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                 ↓                        ↓                   │
//! │          ┌────────────┐           ┌────────────┐             │
//! │          │  Journal   │           │MQTT publish│             │
//! │          └────────────┘           └────────────┘             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod core;
pub mod db;
pub mod detection;
pub mod error;
pub mod escalation;
pub mod ingest;
pub mod sources;

// Re-exports for convenience
pub use config::Config;
pub use core::{EventBus, MonitorHandle, MonitorService, MonitoringController, MonitoringState};
pub use db::Journal;
pub use detection::{AggregateStatus, OverallStatus};
pub use escalation::{EscalationPipeline, EscalationRun};
pub use sources::{SourceId, SourceRegistry, UpdateEvent};

/// TamperWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TamperWatch name
pub const NAME: &str = "TamperWatch";
