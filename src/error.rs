// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Error types shared by the monitoring core

use std::time::Duration;
use thiserror::Error;

use crate::escalation::ChannelKind;
use crate::sources::SourceId;

/// Invalid source or channel configuration. Loading is all-or-nothing, so
/// the previously active configuration stays in place when this is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Source id is zero
    #[error("source '{name}' has invalid id 0")]
    InvalidSourceId {
        /// Configured source name
        name: String,
    },

    /// Source id appears twice
    #[error("source id {0} is configured more than once")]
    DuplicateSource(SourceId),

    /// Enabled channel with an unusable target
    #[error("{channel} channel: {reason}")]
    InvalidChannel {
        /// Offending channel
        channel: ChannelKind,
        /// What is wrong with it
        reason: String,
    },

    /// Channel timeout of zero
    #[error("channel timeout must be greater than zero")]
    ZeroTimeout,

    /// Config file could not be read or written
    #[error("failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Update for an identity that is not (or no longer) registered.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("update for unknown source {0}")]
pub struct UnknownSource(pub SourceId);

/// A single channel adapter failed. Recorded in the escalation run, never
/// propagated to the caller of the update.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Adapter did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Script could not be started
    #[error("failed to start '{command}': {source}")]
    Spawn {
        /// Command as configured
        command: String,
        /// Spawn failure
        #[source]
        source: std::io::Error,
    },

    /// Script exited unsuccessfully
    #[error("'{command}' exited with {status}")]
    ExitStatus {
        /// Command as configured
        command: String,
        /// Exit status as reported by the OS
        status: String,
    },

    /// Webhook request failed
    #[error("http request failed: {0}")]
    Http(String),

    /// MQTT publish failed
    #[error("mqtt publish failed: {0}")]
    Mqtt(String),

    /// Adapter cannot handle the target
    #[error("unsupported target: {0}")]
    Unsupported(String),

    /// Any other adapter failure
    #[error("{0}")]
    Other(String),
}

/// The monitor service task has stopped and no longer accepts commands.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("monitor service is not running")]
pub struct ServiceClosed;
