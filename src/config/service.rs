// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Service supervision configuration
//!
//! Cadences and retry budget of the supervisor and the persistence cycle.

use serde::{Deserialize, Serialize};

use crate::registry::ReadMode;

/// Settings for the supervisor loop and the persistence cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Consecutive failed schema-source connections tolerated before the
    /// service stops. Zero disables the budget and retries forever.
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,

    /// Wait between failed connection attempts, in milliseconds.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// How often the schema source's liveness is probed while active, in
    /// milliseconds.
    #[serde(default = "default_supervision_interval_ms")]
    pub supervision_interval_ms: u64,

    /// Cadence of the persistence cycle, in milliseconds. Independent of the
    /// per-device poll intervals and typically slower.
    #[serde(default = "default_persistence_interval_ms")]
    pub persistence_interval_ms: u64,

    /// Only devices configured with this read mode are loaded.
    #[serde(default = "default_read_mode_filter")]
    pub read_mode_filter: ReadMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: default_max_connect_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            supervision_interval_ms: default_supervision_interval_ms(),
            persistence_interval_ms: default_persistence_interval_ms(),
            read_mode_filter: default_read_mode_filter(),
        }
    }
}

fn default_max_connect_attempts() -> u32 {
    5
}

fn default_reconnect_backoff_ms() -> u64 {
    5000
}

fn default_supervision_interval_ms() -> u64 {
    10_000
}

fn default_persistence_interval_ms() -> u64 {
    1000
}

fn default_read_mode_filter() -> ReadMode {
    ReadMode::Holding
}
