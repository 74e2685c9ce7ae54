// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Weight stabilization state machine
//!
//! Debounces the stream of decoded weight readings into discrete stable-weight
//! events. The machine arms on an empty scale, waits for the load to rise
//! above a threshold, then requires the 2-decimal rounding of the reading to
//! hold still for a configured duration before emitting. One event per cycle:
//! after emission the machine returns to `WaitingZero` unarmed, so the scale
//! has to empty out again before the next weighing.
//!
//! The machine is driven exclusively by the persistence cycle, once per device
//! per tick, with whatever the latest decoded weight is at that instant. The
//! current instant is a parameter so tests can run on a synthetic clock.

use chrono::{DateTime, Utc};

/// Thresholds and timing of the debounce, from the weighing configuration.
#[derive(Debug, Clone, Copy)]
pub struct StabilizationConfig {
    /// Readings with |w| below this count as an empty scale.
    pub zero_tolerance: f64,
    /// Readings must exceed this for the machine to consider a load present.
    pub rise_minimum: f64,
    /// How long the rounded reading must hold still before emission.
    pub stable_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeighingPhase {
    #[default]
    WaitingZero,
    WaitingRise,
    Stabilizing,
}

/// Mutable state of one device's debounce.
#[derive(Debug, Clone, Default)]
pub struct StabilizationState {
    pub phase: WeighingPhase,
    pub armed: bool,
    /// 2-decimal rounding currently being held still.
    pub tracked: Option<f64>,
    pub stable_since: Option<DateTime<Utc>>,
}

/// Round half away from zero to two decimals, used both for comparison and
/// for the emitted value.
pub fn round2(w: f64) -> f64 {
    (w * 100.0).round() / 100.0
}

impl StabilizationState {
    /// Feed one reading into the machine.
    ///
    /// Returns the rounded stable weight when the reading has held still long
    /// enough, at most once per weighing cycle.
    pub fn evaluate(
        &mut self,
        weight: f64,
        now: DateTime<Utc>,
        config: &StabilizationConfig,
    ) -> Option<f64> {
        let abs = weight.abs();
        let rounded = round2(weight);

        match self.phase {
            WeighingPhase::WaitingZero => {
                self.tracked = None;
                self.stable_since = None;
                if abs < config.zero_tolerance {
                    self.armed = true;
                }
                if self.armed && weight > config.rise_minimum {
                    self.phase = WeighingPhase::WaitingRise;
                }
                None
            }
            WeighingPhase::WaitingRise => {
                if abs < config.zero_tolerance {
                    self.phase = WeighingPhase::WaitingZero;
                    self.armed = true;
                    return None;
                }
                if weight > config.rise_minimum {
                    self.phase = WeighingPhase::Stabilizing;
                    self.tracked = Some(rounded);
                    self.stable_since = Some(now);
                }
                None
            }
            WeighingPhase::Stabilizing => {
                if abs < config.zero_tolerance {
                    // Load removed mid-weighing: start over, still armed.
                    self.phase = WeighingPhase::WaitingZero;
                    self.armed = true;
                    self.tracked = None;
                    self.stable_since = None;
                    return None;
                }
                if self.tracked == Some(rounded) {
                    let since = self.stable_since?;
                    if (now - since).num_milliseconds() >= config.stable_duration_ms as i64 {
                        self.phase = WeighingPhase::WaitingZero;
                        self.armed = false;
                        self.tracked = None;
                        self.stable_since = None;
                        return Some(rounded);
                    }
                    None
                } else {
                    // The rounded reading shifted: restart the stability timer.
                    self.tracked = Some(rounded);
                    self.stable_since = Some(now);
                    None
                }
            }
        }
    }
}
