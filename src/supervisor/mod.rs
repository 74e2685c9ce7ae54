// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Supervisor
//!
//! Owns the service lifecycle: connect to the schema source, load the device
//! fleet, replace the registry, spawn one worker per device plus the
//! persistence cycle, and watch the source's liveness. A lost connection
//! cancels the fleet and retries with backoff, up to a configured attempt
//! budget; exhausting the budget is the only failure that stops the service.
//!
//! Every spawned task holds a token derived from the supervisor's root token,
//! so cancelling the root cancels the whole tree. Shutdown waits a bounded
//! [`DRAIN_TIMEOUT`] per fleet for tasks to report exit and logs stragglers
//! instead of hanging on them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::decoding::ByteOrder;
use crate::persistence::{PersistenceCycle, PersistenceSink};
use crate::registry::{DeviceRegistry, DeviceState};
use crate::schema::SchemaSource;
use crate::stabilization::StabilizationConfig;
use crate::transport::TransportFactory;
use crate::worker::DeviceWorker;

/// Upper bound on waiting for workers and the persistence cycle to exit.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the supervisor needs out of the configuration.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Give up after this many consecutive failed connect attempts; zero
    /// means retry forever.
    pub max_connect_attempts: u32,
    pub reconnect_backoff: Duration,
    pub supervision_interval: Duration,
    pub persistence_interval: Duration,
    pub byte_order: ByteOrder,
    pub weighing: StabilizationConfig,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_connect_attempts: config.service.max_connect_attempts,
            reconnect_backoff: Duration::from_millis(config.service.reconnect_backoff_ms),
            supervision_interval: Duration::from_millis(config.service.supervision_interval_ms),
            persistence_interval: Duration::from_millis(config.service.persistence_interval_ms),
            byte_order: config.weighing.byte_order,
            weighing: config.weighing.stabilization(),
        }
    }
}

struct WorkerHandle {
    device_id: u32,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum SessionOutcome {
    /// The root token fired; proceed to drain.
    Cancelled,
    /// Schema source failed or its liveness lapsed; retry with backoff.
    Lost(String),
}

pub struct Supervisor {
    registry: Arc<DeviceRegistry>,
    source: Arc<dyn SchemaSource>,
    sink: Arc<dyn PersistenceSink>,
    transports: Arc<dyn TransportFactory>,
    settings: SupervisorSettings,
    root: CancellationToken,
    workers: Vec<WorkerHandle>,
    cycle: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        source: Arc<dyn SchemaSource>,
        sink: Arc<dyn PersistenceSink>,
        transports: Arc<dyn TransportFactory>,
        settings: SupervisorSettings,
        root: CancellationToken,
    ) -> Self {
        Self {
            registry,
            source,
            sink,
            transports,
            settings,
            root,
            workers: Vec::new(),
            cycle: None,
        }
    }

    /// Run until shutdown or until the connect attempt budget is exhausted.
    pub async fn run(mut self) -> Result<()> {
        // The persistence cycle lives for the whole process, across schema
        // reloads; only workers are torn down per session.
        self.spawn_persistence_cycle();

        let mut attempts: u32 = 0;
        let outcome = loop {
            if self.root.is_cancelled() {
                break Ok(());
            }
            match self.session(&mut attempts).await {
                SessionOutcome::Cancelled => break Ok(()),
                SessionOutcome::Lost(reason) => {
                    warn!("schema source lost: {}", reason);
                    self.stop_workers().await;
                    attempts += 1;
                    if self.settings.max_connect_attempts > 0
                        && attempts >= self.settings.max_connect_attempts
                    {
                        error!(
                            "schema source unreachable after {} attempts, stopping service",
                            attempts
                        );
                        break Err(attempts);
                    }
                    tokio::select! {
                        _ = self.root.cancelled() => break Ok(()),
                        _ = sleep(self.settings.reconnect_backoff) => {}
                    }
                }
            }
        };

        self.drain().await;
        match outcome {
            Ok(()) => {
                info!("supervisor stopped");
                Ok(())
            }
            Err(attempts) => bail!("schema source unreachable after {attempts} attempts"),
        }
    }

    /// One connect → load → spawn → watch pass.
    async fn session(&mut self, attempts: &mut u32) -> SessionOutcome {
        if let Err(err) = self.source.connect().await {
            return SessionOutcome::Lost(err.to_string());
        }
        info!("schema source connected");
        *attempts = 0;

        let devices = match self.source.load_devices().await {
            Ok(devices) => devices,
            Err(err) => return SessionOutcome::Lost(err.to_string()),
        };

        let mut states = Vec::with_capacity(devices.len());
        for descriptor in devices {
            let weight_value_id = descriptor.select_weight_value();
            if weight_value_id.is_none() {
                warn!(
                    "[{}] no weight value configured; readings will not be persisted",
                    descriptor.id
                );
            }
            states.push(Arc::new(DeviceState::new(descriptor, weight_value_id)));
        }

        // Old fleet out before the new one goes in: one live worker per
        // device id at any time.
        self.stop_workers().await;
        self.registry.replace(states.clone());
        info!("registry loaded with {} devices", self.registry.len());
        for state in states {
            self.spawn_worker(state);
        }

        loop {
            tokio::select! {
                _ = self.root.cancelled() => return SessionOutcome::Cancelled,
                _ = sleep(self.settings.supervision_interval) => {}
            }
            if !self.source.is_connected().await {
                return SessionOutcome::Lost("liveness check failed".into());
            }
        }
    }

    fn spawn_worker(&mut self, state: Arc<DeviceState>) {
        let cancel = self.root.child_token();
        let transport = self.transports.create(&state.descriptor);
        let worker = DeviceWorker::new(
            state.clone(),
            transport,
            self.settings.byte_order,
            cancel.clone(),
        );
        let handle = tokio::spawn(worker.run());
        self.workers.push(WorkerHandle {
            device_id: state.descriptor.id,
            cancel,
            handle,
        });
    }

    fn spawn_persistence_cycle(&mut self) {
        let cancel = self.root.child_token();
        let cycle = PersistenceCycle::new(
            self.registry.clone(),
            self.sink.clone(),
            self.settings.weighing,
            self.settings.persistence_interval,
            cancel.clone(),
        );
        self.cycle = Some((cancel, tokio::spawn(cycle.run())));
    }

    /// Cancel all workers and wait out [`DRAIN_TIMEOUT`] for their exit.
    async fn stop_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        info!("stopping {} workers", self.workers.len());
        for worker in &self.workers {
            worker.cancel.cancel();
        }
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        for worker in self.workers.drain(..) {
            match timeout_at(deadline, worker.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    error!(
                        "[{}] worker terminated abnormally: {}",
                        worker.device_id, join_err
                    );
                    if let Some(state) = self.registry.get(worker.device_id) {
                        state.mark_faulted(&join_err.to_string());
                    }
                }
                Err(_) => {
                    warn!(
                        "[{}] worker did not stop within {:?}",
                        worker.device_id, DRAIN_TIMEOUT
                    );
                }
            }
        }
    }

    /// Full drain: workers plus the persistence cycle, bounded wait each.
    async fn drain(&mut self) {
        info!("draining supervisor tasks");
        self.root.cancel();
        self.stop_workers().await;
        if let Some((cancel, handle)) = self.cycle.take() {
            cancel.cancel();
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            match timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    error!("persistence cycle terminated abnormally: {}", join_err)
                }
                Err(_) => warn!("persistence cycle did not stop within {:?}", DRAIN_TIMEOUT),
            }
        }
    }
}
