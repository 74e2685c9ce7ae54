// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Weighing configuration
//!
//! Thresholds of the stabilization machine and the float byte order shared by
//! all devices.

use serde::{Deserialize, Serialize};

use crate::decoding::ByteOrder;
use crate::stabilization::StabilizationConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeighingConfig {
    /// Readings with an absolute value below this count as an empty scale.
    #[serde(default = "default_zero_tolerance")]
    pub zero_tolerance: f64,

    /// Readings must exceed this before a weighing cycle starts.
    #[serde(default = "default_rise_minimum")]
    pub rise_minimum: f64,

    /// How long the rounded reading must hold still before the stable-weight
    /// event fires, in milliseconds.
    #[serde(default = "default_stable_duration_ms")]
    pub stable_duration_ms: u64,

    /// Byte layout of float32 values across their register pair.
    #[serde(default)]
    pub byte_order: ByteOrder,
}

impl WeighingConfig {
    pub fn stabilization(&self) -> StabilizationConfig {
        StabilizationConfig {
            zero_tolerance: self.zero_tolerance,
            rise_minimum: self.rise_minimum,
            stable_duration_ms: self.stable_duration_ms,
        }
    }
}

impl Default for WeighingConfig {
    fn default() -> Self {
        Self {
            zero_tolerance: default_zero_tolerance(),
            rise_minimum: default_rise_minimum(),
            stable_duration_ms: default_stable_duration_ms(),
            byte_order: ByteOrder::default(),
        }
    }
}

fn default_zero_tolerance() -> f64 {
    0.05
}

fn default_rise_minimum() -> f64 {
    0.10
}

fn default_stable_duration_ms() -> u64 {
    2000
}
