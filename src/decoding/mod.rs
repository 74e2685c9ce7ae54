// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register block decoding
//!
//! Pure interpretation of a raw block of 16-bit words against a device's value
//! descriptors. Positions are 1-based from the block start: word positions for
//! scalar kinds, absolute bit positions for bitflags. Floats occupy two
//! consecutive words and are reassembled according to a configurable byte
//! order, since scale heads disagree on how to lay an IEEE-754 single across
//! two registers.
//!
//! Nothing in this module performs I/O or holds state; failures are reported
//! per value and never abort the siblings.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{ValueDescriptor, ValueKind};

/// Byte layout of a float32 across two consecutive registers.
///
/// Labelling the wire bytes `A` = high byte of the first word, `B` = low byte
/// of the first word, `C` = high byte of the second word and `D` = low byte of
/// the second word, the tag spells the little-endian memory layout of the
/// reassembled IEEE-754 value. `DCBA` is the fully little-endian word-swapped
/// layout most heads ship with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ByteOrder {
    Abcd,
    Badc,
    Cdab,
    #[default]
    Dcba,
}

impl ByteOrder {
    /// Reassemble a float from the two words of its register pair.
    pub fn float_from_words(self, hi: u16, lo: u16) -> f32 {
        let a = (hi >> 8) as u8;
        let b = (hi & 0xff) as u8;
        let c = (lo >> 8) as u8;
        let d = (lo & 0xff) as u8;
        let bytes = match self {
            ByteOrder::Abcd => [a, b, c, d],
            ByteOrder::Badc => [b, a, d, c],
            ByteOrder::Cdab => [c, d, a, b],
            ByteOrder::Dcba => [d, c, b, a],
        };
        f32::from_le_bytes(bytes)
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ByteOrder::Abcd => "ABCD",
            ByteOrder::Badc => "BADC",
            ByteOrder::Cdab => "CDAB",
            ByteOrder::Dcba => "DCBA",
        };
        f.write_str(tag)
    }
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ABCD" => Ok(ByteOrder::Abcd),
            "BADC" => Ok(ByteOrder::Badc),
            "CDAB" => Ok(ByteOrder::Cdab),
            "DCBA" => Ok(ByteOrder::Dcba),
            other => Err(format!("unknown byte order tag '{other}'")),
        }
    }
}

/// Last decoded value of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedValue {
    Unsigned(u16),
    Decimal(f64),
    Flag(bool),
    Float(f64),
}

impl DecodedValue {
    /// Numeric view used by the stabilization engine; flags do not qualify.
    pub fn as_weight(&self) -> Option<f64> {
        match self {
            DecodedValue::Unsigned(v) => Some(f64::from(*v)),
            DecodedValue::Decimal(v) | DecodedValue::Float(v) => Some(*v),
            DecodedValue::Flag(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("position {position} does not resolve to a word index")]
    InvalidPosition { position: u16 },
    #[error("word position {position} outside block of {len} words")]
    WordOutOfRange { position: u16, len: usize },
    #[error("bit position {position} outside block of {len} words")]
    BitOutOfRange { position: u16, len: usize },
    #[error("float32 at position {position} needs two words, block has {len}")]
    FloatOutOfRange { position: u16, len: usize },
    #[error("unsupported value kind")]
    UnsupportedKind,
}

/// Decode a single descriptor against a register block.
pub fn decode_value(
    words: &[u16],
    value: &ValueDescriptor,
    byte_order: ByteOrder,
) -> Result<DecodedValue, DecodeError> {
    let position = value.position;
    let index = usize::from(position)
        .checked_sub(1)
        .ok_or(DecodeError::InvalidPosition { position })?;

    if value.is_float() {
        if index + 1 >= words.len() {
            return Err(DecodeError::FloatOutOfRange {
                position,
                len: words.len(),
            });
        }
        let f = byte_order.float_from_words(words[index], words[index + 1]);
        return Ok(DecodedValue::Float(f64::from(f)));
    }

    match value.kind {
        ValueKind::Integer16 => words
            .get(index)
            .map(|w| DecodedValue::Unsigned(*w))
            .ok_or(DecodeError::WordOutOfRange {
                position,
                len: words.len(),
            }),
        ValueKind::Decimal16 => words
            .get(index)
            .map(|w| DecodedValue::Decimal(round1(f64::from(*w as i16) / 10.0)))
            .ok_or(DecodeError::WordOutOfRange {
                position,
                len: words.len(),
            }),
        ValueKind::Bitflag => {
            // `index` is an absolute 0-based bit counted from the block base.
            let word = index / 16;
            let bit = index % 16;
            words
                .get(word)
                .map(|w| DecodedValue::Flag((w & (1u16 << bit)) != 0))
                .ok_or(DecodeError::BitOutOfRange {
                    position,
                    len: words.len(),
                })
        }
        ValueKind::Float32 | ValueKind::Unsupported => Err(DecodeError::UnsupportedKind),
    }
}

/// Decode every descriptor of a device against a fresh register block.
///
/// One value's failure never aborts the others: a failed value decodes to
/// `None` and leaves a diagnostic in the log, keyed by device and value id.
pub fn decode_block(
    device_id: u32,
    words: &[u16],
    values: &[ValueDescriptor],
    byte_order: ByteOrder,
) -> HashMap<u32, Option<DecodedValue>> {
    let mut decoded = HashMap::with_capacity(values.len());
    for value in values {
        match decode_value(words, value, byte_order) {
            Ok(v) => {
                decoded.insert(value.id, Some(v));
            }
            Err(err) => {
                warn!(
                    "[{}] value {} (pos {}): {}",
                    device_id, value.id, value.position, err
                );
                decoded.insert(value.id, None);
            }
        }
    }
    decoded
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Scalar formats understood by the diagnostic probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFormat {
    U16,
    S16,
    U32,
    S32,
    Float32,
}

impl FromStr for ScalarFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u16" => Ok(ScalarFormat::U16),
            "s16" => Ok(ScalarFormat::S16),
            "u32" => Ok(ScalarFormat::U32),
            "s32" => Ok(ScalarFormat::S32),
            "float" | "float32" => Ok(ScalarFormat::Float32),
            other => Err(format!("unknown scalar format '{other}'")),
        }
    }
}

/// Interpret the head of a register block as one scalar reading.
///
/// 32-bit formats combine the first two words high-word-first; `scale` and
/// `offset` apply a linear calibration on top. Used by the diagnostic probe,
/// not by the datalogger service.
pub fn parse_scalar(
    words: &[u16],
    format: ScalarFormat,
    byte_order: ByteOrder,
    scale: f64,
    offset: f64,
) -> Result<f64, DecodeError> {
    let need = match format {
        ScalarFormat::U16 | ScalarFormat::S16 => 1,
        _ => 2,
    };
    if words.len() < need {
        return Err(DecodeError::WordOutOfRange {
            position: need as u16,
            len: words.len(),
        });
    }
    let raw = match format {
        ScalarFormat::U16 => f64::from(words[0]),
        ScalarFormat::S16 => f64::from(words[0] as i16),
        ScalarFormat::U32 => f64::from((u32::from(words[0]) << 16) | u32::from(words[1])),
        ScalarFormat::S32 => {
            f64::from(((i32::from(words[0] as i16)) << 16) | i32::from(words[1]))
        }
        ScalarFormat::Float32 => f64::from(byte_order.float_from_words(words[0], words[1])),
    };
    Ok(raw * scale + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_tags_round_trip_from_str() {
        for tag in ["ABCD", "BADC", "CDAB", "DCBA"] {
            let order: ByteOrder = tag.parse().unwrap();
            assert_eq!(order.to_string(), tag);
        }
        assert!("ACBD".parse::<ByteOrder>().is_err());
    }

    #[test]
    fn dcba_is_little_endian_word_swapped() {
        // 1.0f32 is 0x3F800000: little-endian memory [00, 00, 80, 3F].
        // Under DCBA that spells D=0x00 C=0x00 B=0x80 A=0x3F, so the wire
        // words are hi=0x3F80, lo=0x0000.
        assert_eq!(ByteOrder::Dcba.float_from_words(0x3F80, 0x0000), 1.0);
    }

    #[test]
    fn position_zero_is_a_decode_failure() {
        let v = ValueDescriptor {
            id: 1,
            position: 0,
            kind: ValueKind::Integer16,
            bits: 16,
        };
        assert_eq!(
            decode_value(&[42], &v, ByteOrder::Dcba),
            Err(DecodeError::InvalidPosition { position: 0 })
        );
    }

    #[test]
    fn unsupported_kind_fails_but_does_not_abort_siblings() {
        let values = vec![
            ValueDescriptor {
                id: 1,
                position: 1,
                kind: ValueKind::Unsupported,
                bits: 16,
            },
            ValueDescriptor {
                id: 2,
                position: 2,
                kind: ValueKind::Integer16,
                bits: 16,
            },
        ];
        let decoded = decode_block(9, &[7, 8], &values, ByteOrder::Dcba);
        assert_eq!(decoded.get(&1), Some(&None));
        assert_eq!(decoded.get(&2), Some(&Some(DecodedValue::Unsigned(8))));
    }
}
