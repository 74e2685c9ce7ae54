// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the device worker
//!
//! A scripted in-memory transport stands in for the wire so the poll loop's
//! change detection, quality bookkeeping and cancellation behavior are
//! observable without a Modbus server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use rust_weighbridge::decoding::{ByteOrder, DecodedValue};
use rust_weighbridge::registry::{
    DeviceDescriptor, DeviceState, ReadMode, ReadQuality, ValueDescriptor, ValueKind, WorkerPhase,
};
use rust_weighbridge::transport::{RegisterTransport, TransportError};
use rust_weighbridge::worker::DeviceWorker;

/// Transport that replays a scripted sequence of poll outcomes, then keeps
/// repeating the last one.
struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<Vec<u16>, TransportError>>>>,
    fallback: Result<Vec<u16>, TransportError>,
}

impl ScriptedTransport {
    fn new(
        script: Vec<Result<Vec<u16>, TransportError>>,
        fallback: Result<Vec<u16>, TransportError>,
    ) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback,
        }
    }
}

#[async_trait]
impl RegisterTransport for ScriptedTransport {
    async fn read_block(
        &mut self,
        _mode: ReadMode,
        _addr: u16,
        _count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn disconnect(&mut self) {}
}

fn descriptor(poll_interval_ms: u64) -> DeviceDescriptor {
    DeviceDescriptor {
        id: 1,
        address: "127.0.0.1".into(),
        unit: 1,
        base_offset: 0,
        block_bits: 32,
        read_mode: ReadMode::Holding,
        poll_interval_ms,
        values: vec![
            ValueDescriptor {
                id: 10,
                position: 1,
                kind: ValueKind::Integer16,
                bits: 16,
            },
            ValueDescriptor {
                id: 11,
                position: 2,
                kind: ValueKind::Decimal16,
                bits: 16,
            },
        ],
    }
}

fn spawn_worker(
    state: Arc<DeviceState>,
    transport: ScriptedTransport,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let worker = DeviceWorker::new(
        state,
        Box::new(transport),
        ByteOrder::Dcba,
        cancel.clone(),
    );
    (cancel.clone(), tokio::spawn(worker.run()))
}

#[tokio::test]
async fn first_sample_is_decoded_and_marks_pending() {
    let state = Arc::new(DeviceState::new(descriptor(100), Some(11)));
    let transport = ScriptedTransport::new(vec![], Ok(vec![42, 123]));
    let (cancel, handle) = spawn_worker(state.clone(), transport);

    sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert!(state.is_pending());
    let sample = state.sample();
    assert_eq!(sample.current, Some(vec![42, 123]));
    assert_eq!(sample.current_quality, ReadQuality::Ok);
    assert_eq!(sample.decoded.get(&10), Some(&Some(DecodedValue::Unsigned(42))));
    assert_eq!(sample.decoded.get(&11), Some(&Some(DecodedValue::Decimal(12.3))));
}

#[tokio::test]
async fn unchanged_sample_does_not_reraise_pending() {
    let state = Arc::new(DeviceState::new(descriptor(100), Some(11)));
    let transport = ScriptedTransport::new(vec![], Ok(vec![42, 123]));
    let (cancel, handle) = spawn_worker(state.clone(), transport);

    sleep(Duration::from_millis(150)).await;
    assert!(state.is_pending());
    // Simulate the persistence cycle consuming the update.
    state.clear_pending();
    let decoded_before = state.sample().decoded.clone();

    // Several more identical polls happen here.
    sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert!(!state.is_pending(), "identical polls must not re-mark pending");
    assert_eq!(state.sample().decoded, decoded_before);
}

#[tokio::test]
async fn changed_sample_is_redecoded_and_marks_pending() {
    let state = Arc::new(DeviceState::new(descriptor(100), Some(11)));
    let transport = ScriptedTransport::new(vec![Ok(vec![42, 123])], Ok(vec![42, 200]));
    let (cancel, handle) = spawn_worker(state.clone(), transport);

    sleep(Duration::from_millis(60)).await;
    state.clear_pending();

    sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert!(state.is_pending());
    assert_eq!(
        state.sample().decoded.get(&11),
        Some(&Some(DecodedValue::Decimal(20.0)))
    );
}

#[tokio::test]
async fn read_failure_degrades_quality_but_keeps_last_values() {
    let state = Arc::new(DeviceState::new(descriptor(100), Some(11)));
    let transport = ScriptedTransport::new(
        vec![Ok(vec![42, 123])],
        Err(TransportError::Link("connection reset".into())),
    );
    let (cancel, handle) = spawn_worker(state.clone(), transport);

    sleep(Duration::from_millis(60)).await;
    state.clear_pending();

    sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    // The degradation is pending for the cycle to observe, but the last
    // decoded values survive the fault.
    assert!(state.is_pending());
    let sample = state.sample();
    assert_eq!(sample.current, None);
    assert_eq!(sample.current_quality, ReadQuality::CommError);
    assert_eq!(sample.decoded.get(&10), Some(&Some(DecodedValue::Unsigned(42))));
    let status = state.status();
    assert!(status.last_error.as_deref().unwrap_or("").contains("connection reset"));
}

#[tokio::test]
async fn repeated_failures_do_not_rearm_pending() {
    let state = Arc::new(DeviceState::new(descriptor(100), Some(11)));
    let transport =
        ScriptedTransport::new(vec![], Err(TransportError::Link("unreachable".into())));
    let (cancel, handle) = spawn_worker(state.clone(), transport);

    sleep(Duration::from_millis(150)).await;
    assert!(state.is_pending());
    state.clear_pending();

    sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert!(
        !state.is_pending(),
        "a steady failure state must not re-mark pending every cycle"
    );
}

#[tokio::test]
async fn timeout_failures_carry_the_timeout_quality() {
    let state = Arc::new(DeviceState::new(descriptor(100), Some(11)));
    let transport = ScriptedTransport::new(
        vec![],
        Err(TransportError::Timeout(Duration::from_millis(50))),
    );
    let (cancel, handle) = spawn_worker(state.clone(), transport);

    sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert_eq!(state.sample().current_quality, ReadQuality::Timeout);
}

#[tokio::test]
async fn cancellation_aborts_the_cadence_sleep_immediately() {
    // A one-minute poll interval: the worker only exits promptly if the
    // cancellation aborts the sleep rather than waiting it out.
    let state = Arc::new(DeviceState::new(descriptor(60_000), Some(11)));
    let transport = ScriptedTransport::new(vec![], Ok(vec![1, 2]));
    let (cancel, handle) = spawn_worker(state.clone(), transport);

    sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    timeout(Duration::from_millis(500), handle)
        .await
        .expect("worker must exit well within the drain bound")
        .unwrap();

    assert_eq!(state.status().phase, WorkerPhase::Stopped);
}
