// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device worker
//!
//! One task per registered device: keep the transport connection alive, read
//! the register block on the configured cadence, and decode it when something
//! actually changed. The worker is the single writer of its device's sample
//! section; stabilization is driven elsewhere, so poll cadence and weighing
//! cadence stay independent.
//!
//! Read faults are per-cycle: the device is marked degraded and the loop keeps
//! going. Only cancellation ends the loop, and both the read and the cadence
//! sleep abort immediately when it fires.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::decoding::{decode_block, ByteOrder};
use crate::registry::{DeviceState, ReadQuality, WorkerPhase};
use crate::transport::{RegisterTransport, TransportError};

pub struct DeviceWorker {
    state: Arc<DeviceState>,
    transport: Box<dyn RegisterTransport>,
    byte_order: ByteOrder,
    cancel: CancellationToken,
}

impl DeviceWorker {
    pub fn new(
        state: Arc<DeviceState>,
        transport: Box<dyn RegisterTransport>,
        byte_order: ByteOrder,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            transport,
            byte_order,
            cancel,
        }
    }

    /// Poll loop; runs until the worker's token is cancelled.
    pub async fn run(mut self) {
        let device_id = self.state.descriptor.id;
        let interval = self.state.descriptor.poll_interval();
        let count = self.state.descriptor.block_words();
        let mode = self.state.descriptor.read_mode;
        let base = self.state.descriptor.base_offset;

        self.state.status().phase = WorkerPhase::Running;
        info!(
            "[{}] worker started ({:?} {}+{} words every {:?})",
            device_id, mode, base, count, interval
        );

        loop {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = self.transport.read_block(mode, base, count) => outcome,
            };

            match outcome {
                Ok(words) => self.store_success(words),
                Err(err) => {
                    warn!("[{}] poll failed: {}", device_id, err);
                    self.store_failure(&err);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(interval) => {}
            }
        }

        self.transport.disconnect().await;
        let mut status = self.state.status();
        if status.phase != WorkerPhase::Error {
            status.phase = WorkerPhase::Stopped;
        }
        info!("[{}] worker stopped", device_id);
    }

    /// Record a good poll; decode only when the words or the quality moved.
    fn store_success(&self, words: Vec<u16>) {
        let device_id = self.state.descriptor.id;
        let mut changed = false;
        {
            let mut sample = self.state.sample();
            sample.current = Some(words.clone());
            sample.current_quality = ReadQuality::Ok;

            if sample.decoded_sample.as_deref() != Some(&words[..])
                || sample.decoded_quality != Some(ReadQuality::Ok)
            {
                sample.decoded = decode_block(
                    device_id,
                    &words,
                    &self.state.descriptor.values,
                    self.byte_order,
                );
                sample.decoded_sample = Some(words);
                sample.decoded_quality = Some(ReadQuality::Ok);
                changed = true;
            } else {
                debug!("[{}] block unchanged, decode skipped", device_id);
            }
        }
        // The pending flag is raised only after the full decoded set is in
        // place, so the persistence cycle always observes a consistent map.
        if changed {
            self.state.mark_pending();
        }
        self.state.status().last_error = None;
    }

    /// Record a failed poll. Previously decoded values stay in place; the
    /// quality transition is what gets surfaced downstream.
    fn store_failure(&self, err: &TransportError) {
        let quality = err.quality();
        let mut degraded = false;
        {
            let mut sample = self.state.sample();
            sample.current = None;
            sample.current_quality = quality;

            if sample.decoded_quality != Some(quality) || sample.decoded_sample.is_some() {
                sample.decoded_sample = None;
                sample.decoded_quality = Some(quality);
                degraded = true;
            }
        }
        if degraded {
            self.state.mark_pending();
        }
        self.state.status().last_error = Some(err.to_string());
    }
}
