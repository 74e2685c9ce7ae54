// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Deterministic tests for the persistence cycle
//!
//! The cycle's `tick` is driven directly with a synthetic clock and hand-fed
//! registry state, so the pending-flag contract and the sink interaction are
//! observable without timers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use rust_weighbridge::decoding::DecodedValue;
use rust_weighbridge::persistence::{PersistenceCycle, PersistenceSink, SinkError};
use rust_weighbridge::registry::{
    DeviceDescriptor, DeviceRegistry, DeviceState, ReadMode, ReadQuality, ValueDescriptor,
    ValueKind, QUALITY_CONFIRMED,
};
use rust_weighbridge::stabilization::StabilizationConfig;

#[derive(Default)]
struct RecordingSink {
    upserts: Mutex<Vec<(u32, f64, u8, DateTime<Utc>)>>,
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn upsert_value(
        &self,
        value_id: u32,
        value: f64,
        quality: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.upserts
            .lock()
            .unwrap()
            .push((value_id, value, quality, timestamp));
        Ok(())
    }
}

fn device() -> Arc<DeviceState> {
    let descriptor = DeviceDescriptor {
        id: 1,
        address: "10.0.0.5".into(),
        unit: 1,
        base_offset: 0,
        block_bits: 32,
        read_mode: ReadMode::Holding,
        poll_interval_ms: 200,
        values: vec![ValueDescriptor {
            id: 20,
            position: 1,
            kind: ValueKind::Float32,
            bits: 32,
        }],
    };
    let weight = descriptor.select_weight_value();
    Arc::new(DeviceState::new(descriptor, weight))
}

/// Pretend the worker decoded a fresh sample carrying the given weight.
fn feed_weight(state: &DeviceState, weight: f64, words: Vec<u16>) {
    {
        let mut sample = state.sample();
        sample.current = Some(words.clone());
        sample.current_quality = ReadQuality::Ok;
        sample.decoded_sample = Some(words);
        sample.decoded_quality = Some(ReadQuality::Ok);
        sample.decoded.insert(20, Some(DecodedValue::Float(weight)));
    }
    state.mark_pending();
}

fn cycle(registry: Arc<DeviceRegistry>, sink: Arc<RecordingSink>) -> PersistenceCycle {
    PersistenceCycle::new(
        registry,
        sink,
        StabilizationConfig {
            zero_tolerance: 0.05,
            rise_minimum: 0.10,
            stable_duration_ms: 200,
        },
        Duration::from_millis(1000),
        CancellationToken::new(),
    )
}

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

#[tokio::test]
async fn stable_sequence_upserts_once_and_clears_pending() {
    let registry = Arc::new(DeviceRegistry::new());
    let state = device();
    registry.replace(vec![state.clone()]);
    let sink = Arc::new(RecordingSink::default());
    let cycle = cycle(registry, sink.clone());

    // Empty scale arms the machine.
    feed_weight(&state, 0.0, vec![0, 0]);
    cycle.tick(at(0)).await;
    assert!(!state.is_pending(), "tick must clear the pending flag");

    // Rise and hold: ticks at 100ms spacing, 200ms stability window.
    for (ms, weight) in [(100, 1.2), (200, 1.2), (300, 1.2), (400, 1.2)] {
        feed_weight(&state, weight, vec![ms as u16, 1]);
        cycle.tick(at(ms)).await;
    }

    let upserts = sink.upserts.lock().unwrap().clone();
    assert_eq!(upserts.len(), 1, "one stable event: {upserts:?}");
    let (value_id, weight, quality, timestamp) = upserts[0];
    assert_eq!(value_id, 20);
    assert_eq!(weight, 1.2);
    assert_eq!(quality, QUALITY_CONFIRMED);
    assert_eq!(timestamp, at(400));
}

#[tokio::test]
async fn tick_skips_devices_without_pending_data() {
    let registry = Arc::new(DeviceRegistry::new());
    let state = device();
    registry.replace(vec![state.clone()]);
    let sink = Arc::new(RecordingSink::default());
    let cycle = cycle(registry, sink.clone());

    feed_weight(&state, 0.0, vec![0, 0]);
    cycle.tick(at(0)).await;

    // No new data: further ticks must not touch the machine or the sink.
    cycle.tick(at(100)).await;
    cycle.tick(at(200)).await;
    assert!(sink.upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tick_records_the_last_persisted_sample() {
    let registry = Arc::new(DeviceRegistry::new());
    let state = device();
    registry.replace(vec![state.clone()]);
    let sink = Arc::new(RecordingSink::default());
    let cycle = cycle(registry, sink.clone());

    feed_weight(&state, 0.0, vec![7, 9]);
    cycle.tick(at(0)).await;

    let persist = state.persist();
    assert_eq!(persist.persisted_sample, Some(vec![7, 9]));
    assert_eq!(persist.persisted_quality, Some(ReadQuality::Ok));
}

#[tokio::test]
async fn non_numeric_weight_clears_pending_without_stabilizing() {
    let registry = Arc::new(DeviceRegistry::new());
    let state = device();
    registry.replace(vec![state.clone()]);
    let sink = Arc::new(RecordingSink::default());
    let cycle = cycle(registry, sink.clone());

    // Decode failure left a null weight slot.
    {
        let mut sample = state.sample();
        sample.current = None;
        sample.current_quality = ReadQuality::CommError;
        sample.decoded.insert(20, None);
    }
    state.mark_pending();

    cycle.tick(at(0)).await;
    assert!(!state.is_pending());
    assert!(sink.upserts.lock().unwrap().is_empty());
}
