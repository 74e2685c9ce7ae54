// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device registry: descriptors and shared runtime state

mod descriptor;
mod state;

pub use descriptor::{
    DeviceDescriptor, ReadMode, ValueDescriptor, ValueKind, MIN_POLL_INTERVAL_MS,
};
pub use state::{
    DeviceRegistry, DeviceState, PersistState, ReadQuality, SampleState, WorkerPhase,
    WorkerStatus, QUALITY_CONFIRMED,
};
