// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-device runtime state and the shared registry
//!
//! Each registered device owns one [`DeviceState`] kept behind an `Arc` in the
//! [`DeviceRegistry`]. The state is split into two locked sections with a
//! single writer each: the sample section is written only by the device's
//! worker, the persistence section only by the persistence cycle. The pending
//! flag sits outside both as an atomic because the worker sets it and the
//! cycle clears it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

use crate::decoding::DecodedValue;
use crate::registry::DeviceDescriptor;
use crate::stabilization::StabilizationState;

/// Device-level quality of the latest poll.
///
/// The numeric codes are the ones the backing store historically used; the
/// persistence sink additionally receives [`QUALITY_CONFIRMED`] for stable
/// weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadQuality {
    Ok,
    Timeout,
    Disconnected,
    CommError,
    ChecksumError,
    InvalidData,
    NoResponse,
    Other,
}

impl ReadQuality {
    pub fn code(self) -> u8 {
        match self {
            ReadQuality::Ok => 0,
            ReadQuality::Timeout => 1,
            ReadQuality::Disconnected => 2,
            ReadQuality::CommError => 3,
            ReadQuality::ChecksumError => 4,
            ReadQuality::InvalidData => 5,
            ReadQuality::NoResponse => 6,
            ReadQuality::Other => 99,
        }
    }
}

/// Quality code written alongside a stable weight.
pub const QUALITY_CONFIRMED: u8 = 100;

/// Lifecycle phase of a device worker, mirrored into the registry so the
/// supervisor can report stragglers and faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Pending,
    Running,
    Stopped,
    Error,
}

#[derive(Debug)]
pub struct WorkerStatus {
    pub phase: WorkerPhase,
    pub last_error: Option<String>,
}

/// Worker-owned section: raw samples and their decoded projection.
#[derive(Debug)]
pub struct SampleState {
    /// Words of the latest poll, `None` when the poll failed.
    pub current: Option<Vec<u16>>,
    pub current_quality: ReadQuality,
    /// The sample the decoded map was last computed from.
    pub decoded_sample: Option<Vec<u16>>,
    pub decoded_quality: Option<ReadQuality>,
    /// value id → last decoded value, `None` after a per-value failure.
    pub decoded: HashMap<u32, Option<DecodedValue>>,
}

/// Cycle-owned section: stabilization machine plus last-persisted bookkeeping.
#[derive(Debug)]
pub struct PersistState {
    pub stabilization: StabilizationState,
    pub persisted_sample: Option<Vec<u16>>,
    pub persisted_quality: Option<ReadQuality>,
}

/// Runtime state of one registered device.
pub struct DeviceState {
    pub descriptor: DeviceDescriptor,
    /// Value id selected by the weight priority rule, `None` for read-only
    /// devices.
    pub weight_value_id: Option<u32>,
    pending: AtomicBool,
    sample: Mutex<SampleState>,
    persist: Mutex<PersistState>,
    status: Mutex<WorkerStatus>,
}

impl DeviceState {
    pub fn new(descriptor: DeviceDescriptor, weight_value_id: Option<u32>) -> Self {
        Self {
            descriptor,
            weight_value_id,
            pending: AtomicBool::new(false),
            sample: Mutex::new(SampleState {
                current: None,
                current_quality: ReadQuality::NoResponse,
                decoded_sample: None,
                decoded_quality: None,
                decoded: HashMap::new(),
            }),
            persist: Mutex::new(PersistState {
                stabilization: StabilizationState::default(),
                persisted_sample: None,
                persisted_quality: None,
            }),
            status: Mutex::new(WorkerStatus {
                phase: WorkerPhase::Pending,
                last_error: None,
            }),
        }
    }

    pub fn sample(&self) -> MutexGuard<'_, SampleState> {
        self.sample.lock().unwrap()
    }

    pub fn persist(&self) -> MutexGuard<'_, PersistState> {
        self.persist.lock().unwrap()
    }

    pub fn status(&self) -> MutexGuard<'_, WorkerStatus> {
        self.status.lock().unwrap()
    }

    /// Mark that a new sample or quality transition is awaiting evaluation.
    pub fn mark_pending(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn clear_pending(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Record an abnormal worker termination so it is observable downstream.
    pub fn mark_faulted(&self, detail: &str) {
        {
            let mut status = self.status();
            status.phase = WorkerPhase::Error;
            status.last_error = Some(detail.to_string());
        }
        {
            let mut sample = self.sample();
            sample.current = None;
            sample.current_quality = ReadQuality::Other;
        }
        self.mark_pending();
    }
}

impl std::fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceState")
            .field("id", &self.descriptor.id)
            .field("weight_value_id", &self.weight_value_id)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Concurrent map of device id → runtime state.
///
/// The registry is the only structure shared between the supervisor, the
/// workers and the persistence cycle; its contents are replaced wholesale on
/// every schema reload.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<u32, Arc<DeviceState>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly loaded set of device states.
    pub fn replace(&self, states: Vec<Arc<DeviceState>>) {
        let mut devices = self.devices.write().unwrap();
        devices.clear();
        for state in states {
            devices.insert(state.descriptor.id, state);
        }
    }

    pub fn get(&self, id: u32) -> Option<Arc<DeviceState>> {
        self.devices.read().unwrap().get(&id).cloned()
    }

    /// Stable view of the current device set for one scan.
    pub fn snapshot(&self) -> Vec<Arc<DeviceState>> {
        let mut states: Vec<_> = self.devices.read().unwrap().values().cloned().collect();
        states.sort_by_key(|s| s.descriptor.id);
        states
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
