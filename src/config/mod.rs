// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the weighbridge datalogger
//!
//! The configuration is backed by a YAML file and validated against an
//! embedded JSON schema before deserialization, followed by a handful of
//! deeper checks the schema cannot express. A rejected file causes the service
//! to fail fast at startup; a commented sample file is written next to the
//! rejected one so the operator has something to edit.
//!
//! ## Sections
//!
//! - `service`: supervisor retry budget and cadences
//! - `transport`: Modbus TCP timeout and default port
//! - `weighing`: stabilization thresholds and float byte order
//! - `devices`: the scale-head fleet served to the schema source
//!
//! ## Usage
//!
//! ```no_run
//! use rust_weighbridge::config::Config;
//! use std::path::Path;
//!
//! let config = Config::from_file(Path::new("config.yaml")).unwrap();
//! println!("{} devices configured", config.devices.len());
//! ```

pub mod devices;
pub mod service;
pub mod transport;
pub mod utils;
pub mod weighing;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use devices::DeviceEntry;
pub use service::ServiceConfig;
pub use transport::TransportConfig;
pub use utils::output_config_schema;
pub use weighing::WeighingConfig;

/// Root configuration structure for the datalogger service.
///
/// Every section falls back to defaults when absent, so a minimal file only
/// needs a `devices` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Supervisor retry budget, supervision and persistence cadences.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Modbus TCP transport settings shared by all devices.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Stabilization thresholds and float byte order.
    #[serde(default)]
    pub weighing: WeighingConfig,

    /// The scale-head fleet.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directory at {:?}", parent)
                })?;
            }
        }

        let sample_config = Self::default();
        sample_config
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        // Load and validate with the schema
        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                match Self::create_sample_config(path) {
                    Ok(_) => debug!("Successfully created sample config"),
                    Err(e) => error!("Failed to create sample config: {}", e),
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        // Perform additional specific validations
        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }
}
