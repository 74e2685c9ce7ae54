// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device list configuration
//!
//! The configured counterpart of the schema source's device table: each entry
//! wraps a [`DeviceDescriptor`] plus the active flag the source filters on.

use serde::{Deserialize, Serialize};

use crate::registry::DeviceDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Inactive devices are skipped at load time.
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(flatten)]
    pub descriptor: DeviceDescriptor,
}

fn default_active() -> bool {
    true
}
