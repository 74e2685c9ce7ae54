// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Validation beyond what the JSON schema expresses, plus the
//! `--show-config-schema` output helper.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use log::debug;

use super::Config;

/// Output the embedded JSON schema to the console.
///
/// Called when the `--show-config-schema` flag is provided on the command
/// line.
///
/// # Example
///
/// ```bash
/// ./rust_weighbridge --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check that a device address is an IP, optionally with an explicit port.
pub fn is_valid_device_address(addr: &str) -> bool {
    addr.parse::<IpAddr>().is_ok() || addr.parse::<SocketAddr>().is_ok()
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - all service and transport intervals are non-zero
/// - the default transport port is within 1-65534
/// - device ids are unique and addresses parse as IP or IP:port
/// - value ids are unique within a device and positions are 1-based
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.service.reconnect_backoff_ms == 0
        || config.service.supervision_interval_ms == 0
        || config.service.persistence_interval_ms == 0
    {
        anyhow::bail!("Service intervals must be greater than zero");
    }

    if config.weighing.stable_duration_ms == 0 {
        anyhow::bail!("weighing.stable_duration_ms must be greater than zero");
    }

    if config.transport.read_timeout_ms == 0 {
        anyhow::bail!("transport.read_timeout_ms must be greater than zero");
    }

    if config.transport.default_port < 1 || config.transport.default_port > 65534 {
        anyhow::bail!("Invalid port number: {}", config.transport.default_port);
    }

    let mut device_ids = HashSet::new();
    for entry in &config.devices {
        let device = &entry.descriptor;
        if !device_ids.insert(device.id) {
            anyhow::bail!("Duplicate device id {}", device.id);
        }

        if !is_valid_device_address(&device.address) {
            anyhow::bail!(
                "Device {} has an invalid address: {}",
                device.id,
                device.address
            );
        }

        let mut value_ids = HashSet::new();
        for value in &device.values {
            if !value_ids.insert(value.id) {
                anyhow::bail!("Device {} has a duplicate value id {}", device.id, value.id);
            }
            if value.position == 0 {
                anyhow::bail!(
                    "Device {} value {} has position 0; positions are 1-based",
                    device.id,
                    value.id
                );
            }
        }
    }

    Ok(())
}
