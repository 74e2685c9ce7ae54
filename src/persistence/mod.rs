// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persistence cycle and sink
//!
//! The cycle ticks on its own interval, independent of (and typically slower
//! than) the device poll loops. Each tick it scans the registry for devices
//! whose pending flag is raised, feeds the latest decoded weight through the
//! stabilization machine, and on a stable-weight event pushes the rounded
//! value to the sink. Sink writes are awaited inline, one device at a time,
//! so all persistence flows through a single path per tick.
//!
//! The pending flag means "new data to evaluate", not "awaiting a successful
//! write": it is cleared after processing whether or not anything was emitted
//! or persisted, and a failed sink call is not retried until a new stable
//! event occurs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::registry::{DeviceRegistry, DeviceState, QUALITY_CONFIRMED};
use crate::stabilization::StabilizationConfig;

#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    #[error("sink rejected write: {0}")]
    Rejected(String),
}

/// Upsert-by-id consumer of confirmed weight values.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn upsert_value(
        &self,
        value_id: u32,
        value: f64,
        quality: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError>;
}

/// Sink that only logs, for running the service without a backing store.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl PersistenceSink for LogSink {
    async fn upsert_value(
        &self,
        value_id: u32,
        value: f64,
        quality: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        info!(
            "upsert value {}: {:.2} (quality {}, {})",
            value_id,
            value,
            quality,
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f")
        );
        Ok(())
    }
}

/// Periodic task driving stabilization and persistence for the whole fleet.
pub struct PersistenceCycle {
    registry: Arc<DeviceRegistry>,
    sink: Arc<dyn PersistenceSink>,
    weighing: StabilizationConfig,
    interval: Duration,
    cancel: CancellationToken,
}

impl PersistenceCycle {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        sink: Arc<dyn PersistenceSink>,
        weighing: StabilizationConfig,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            sink,
            weighing,
            interval,
            cancel,
        }
    }

    /// Tick loop; runs until the cycle's token is cancelled.
    pub async fn run(self) {
        info!("persistence cycle started (every {:?})", self.interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
            self.tick(Utc::now()).await;
        }
        info!("persistence cycle stopped");
    }

    /// One scan over the registry. Public so tests can drive it with a
    /// synthetic clock.
    pub async fn tick(&self, now: DateTime<Utc>) {
        for device in self.registry.snapshot() {
            if !device.is_pending() {
                continue;
            }
            self.process_device(&device, now).await;
        }
    }

    async fn process_device(&self, device: &DeviceState, now: DateTime<Utc>) {
        let device_id = device.descriptor.id;

        // Latest decoded weight, if this device has one and it is numeric.
        let weight = device.weight_value_id.and_then(|value_id| {
            let sample = device.sample();
            sample
                .decoded
                .get(&value_id)
                .copied()
                .flatten()
                .and_then(|v| v.as_weight())
        });

        match (device.weight_value_id, weight) {
            (Some(value_id), Some(weight)) => {
                let emitted = device
                    .persist()
                    .stabilization
                    .evaluate(weight, now, &self.weighing);

                if let Some(stable) = emitted {
                    // The event line goes out regardless of what the sink does.
                    info!("[{}] WEIGHT={:.2}", device_id, stable);
                    match self
                        .sink
                        .upsert_value(value_id, stable, QUALITY_CONFIRMED, now)
                        .await
                    {
                        Ok(()) => info!(
                            "[{}] persisted value {} = {:.2}",
                            device_id, value_id, stable
                        ),
                        Err(err) => error!(
                            "[{}] persist of value {} failed: {}",
                            device_id, value_id, err
                        ),
                    }
                }
            }
            (Some(_), None) => {
                let quality = device.sample().current_quality;
                warn!(
                    "[{}] weight value not decodable this scan (quality {})",
                    device_id,
                    quality.code()
                );
            }
            // Read-only device, already reported at load time.
            (None, _) => {}
        }

        // Bookkeeping: what this scan observed becomes the last-persisted
        // sample, and the pending flag drops no matter the outcome above.
        let (sample, quality) = {
            let sample = device.sample();
            (sample.current.clone(), sample.current_quality)
        };
        {
            let mut persist = device.persist();
            persist.persisted_sample = sample;
            persist.persisted_quality = Some(quality);
        }
        device.clear_pending();
    }
}
