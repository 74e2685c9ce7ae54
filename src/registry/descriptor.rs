// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device and value descriptors
//!
//! A [`DeviceDescriptor`] describes one scale head as loaded from the schema
//! source: where it lives on the network, which register block to read and how
//! often, plus the ordered list of [`ValueDescriptor`]s that give meaning to
//! the words of that block. Descriptors are immutable once loaded; a schema
//! reload replaces them wholesale.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Poll intervals below this floor are clamped up to it.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Which Modbus register table a device is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Holding registers (function code 3).
    Holding,
    /// Input registers (function code 4).
    Input,
}

impl std::str::FromStr for ReadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "holding" => Ok(ReadMode::Holding),
            "input" => Ok(ReadMode::Input),
            other => Err(format!("unknown read mode '{other}'")),
        }
    }
}

/// Declared interpretation of a configured value within the register block.
///
/// Unknown kind tags deserialize to [`ValueKind::Unsupported`] so a stale
/// schema row degrades to a per-value decode failure instead of rejecting the
/// whole device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Single word, unsigned 16-bit.
    Integer16,
    /// Single word, signed 16-bit fixed point with one implied decimal.
    Decimal16,
    /// One bit, addressed absolutely from the block base.
    Bitflag,
    /// Two words reassembled into an IEEE-754 single per the byte-order tag.
    Float32,
    #[serde(other)]
    Unsupported,
}

/// One configured value inside a device's register block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueDescriptor {
    /// Identifier of the value row in the backing store, unique per device.
    pub id: u32,
    /// 1-based word position, or 1-based absolute bit position for bitflags.
    pub position: u16,
    pub kind: ValueKind,
    /// Width hint in bits; 32 marks a float regardless of the declared kind.
    #[serde(default = "default_value_bits")]
    pub bits: u16,
}

impl ValueDescriptor {
    /// Whether this value spans two words as an IEEE-754 single.
    pub fn is_float(&self) -> bool {
        self.kind == ValueKind::Float32 || self.bits == 32
    }
}

/// One scale head as loaded from the schema source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Datalogger identifier, unique across the fleet.
    pub id: u32,
    /// IP address, optionally with an explicit `:port`.
    pub address: String,
    /// Modbus unit identifier.
    #[serde(default = "default_unit")]
    pub unit: u8,
    /// First register of the block.
    pub base_offset: u16,
    /// Width of the block in bits; 32 bits means two words.
    pub block_bits: u16,
    pub read_mode: ReadMode,
    /// Cadence of the poll loop, clamped to [`MIN_POLL_INTERVAL_MS`].
    pub poll_interval_ms: u64,
    pub values: Vec<ValueDescriptor>,
}

impl DeviceDescriptor {
    /// Number of 16-bit words read per poll, never zero.
    pub fn block_words(&self) -> u16 {
        (self.block_bits / 16).max(1)
    }

    /// Poll cadence with the 100ms floor applied.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Select the value tracked as the weight reading.
    ///
    /// Priority: explicit float32 kind, then 32-bit width hint, then
    /// decimal16, then integer16. A device without any of these is read-only
    /// as far as persistence is concerned.
    pub fn select_weight_value(&self) -> Option<u32> {
        self.values
            .iter()
            .find(|v| v.kind == ValueKind::Float32)
            .or_else(|| self.values.iter().find(|v| v.bits == 32))
            .or_else(|| self.values.iter().find(|v| v.kind == ValueKind::Decimal16))
            .or_else(|| self.values.iter().find(|v| v.kind == ValueKind::Integer16))
            .map(|v| v.id)
    }
}

fn default_unit() -> u8 {
    1
}

fn default_value_bits() -> u16 {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(id: u32, kind: ValueKind, bits: u16) -> ValueDescriptor {
        ValueDescriptor {
            id,
            position: id as u16,
            kind,
            bits,
        }
    }

    fn device(values: Vec<ValueDescriptor>) -> DeviceDescriptor {
        DeviceDescriptor {
            id: 7,
            address: "10.0.0.10".into(),
            unit: 1,
            base_offset: 0,
            block_bits: 96,
            read_mode: ReadMode::Holding,
            poll_interval_ms: 500,
            values,
        }
    }

    #[test]
    fn explicit_float_kind_wins_weight_selection() {
        let d = device(vec![
            value(1, ValueKind::Integer16, 16),
            value(2, ValueKind::Decimal16, 16),
            value(3, ValueKind::Float32, 32),
        ]);
        assert_eq!(d.select_weight_value(), Some(3));
    }

    #[test]
    fn width_hint_beats_decimal_kind() {
        let d = device(vec![
            value(1, ValueKind::Decimal16, 16),
            value(2, ValueKind::Integer16, 32),
        ]);
        assert_eq!(d.select_weight_value(), Some(2));
    }

    #[test]
    fn decimal_beats_integer() {
        let d = device(vec![
            value(1, ValueKind::Integer16, 16),
            value(2, ValueKind::Decimal16, 16),
        ]);
        assert_eq!(d.select_weight_value(), Some(2));
    }

    #[test]
    fn bitflag_only_device_has_no_weight() {
        let d = device(vec![value(1, ValueKind::Bitflag, 1)]);
        assert_eq!(d.select_weight_value(), None);
    }

    #[test]
    fn block_words_has_a_floor_of_one() {
        let mut d = device(vec![]);
        d.block_bits = 0;
        assert_eq!(d.block_words(), 1);
        d.block_bits = 96;
        assert_eq!(d.block_words(), 6);
    }

    #[test]
    fn poll_interval_clamps_to_floor() {
        let mut d = device(vec![]);
        d.poll_interval_ms = 10;
        assert_eq!(d.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn unknown_kind_deserializes_as_unsupported() {
        let v: ValueDescriptor =
            serde_yml::from_str("id: 1\nposition: 1\nkind: barcode\nbits: 16\n").unwrap();
        assert_eq!(v.kind, ValueKind::Unsupported);
    }
}
