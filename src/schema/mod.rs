// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Schema source
//!
//! Where device descriptors come from. The supervisor re-queries the source on
//! every reconnect, so implementations must be idempotent: same backing data,
//! same descriptors. The shipped implementation serves the `devices` section
//! of the configuration file; a relational store can slot in behind the same
//! trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DeviceEntry;
use crate::registry::{DeviceDescriptor, ReadMode};

#[derive(Debug, Clone, Error)]
pub enum SchemaSourceError {
    #[error("schema source unavailable: {0}")]
    Unavailable(String),
    #[error("schema query failed: {0}")]
    Query(String),
}

/// Supplier of device descriptors plus a liveness probe.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Open (or re-open) the connection to the backing store.
    async fn connect(&self) -> Result<(), SchemaSourceError>;

    /// Load descriptors for every active device matching the configured
    /// read-mode filter.
    async fn load_devices(&self) -> Result<Vec<DeviceDescriptor>, SchemaSourceError>;

    /// Whether the connection opened by [`connect`](Self::connect) is still
    /// usable. Polled at the supervision interval.
    async fn is_connected(&self) -> bool;
}

/// Schema source backed by the configuration file's device list.
pub struct ConfigSchemaSource {
    entries: Vec<DeviceEntry>,
    filter: ReadMode,
}

impl ConfigSchemaSource {
    pub fn new(entries: Vec<DeviceEntry>, filter: ReadMode) -> Self {
        Self { entries, filter }
    }
}

#[async_trait]
impl SchemaSource for ConfigSchemaSource {
    async fn connect(&self) -> Result<(), SchemaSourceError> {
        Ok(())
    }

    async fn load_devices(&self) -> Result<Vec<DeviceDescriptor>, SchemaSourceError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.active && e.descriptor.read_mode == self.filter)
            .map(|e| e.descriptor.clone())
            .collect())
    }

    async fn is_connected(&self) -> bool {
        true
    }
}
