// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP transport configuration

use serde::{Deserialize, Serialize};

/// Settings shared by every device transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Deadline for a single connect or register read, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// TCP port used when a device address does not carry one. 502 is the
    /// standard Modbus TCP port.
    #[serde(default = "default_port")]
    pub default_port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            default_port: default_port(),
        }
    }
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_port() -> u16 {
    502
}
