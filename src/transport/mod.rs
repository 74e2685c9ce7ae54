// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register transport
//!
//! The wire seam between a device worker and its scale head: connect, read one
//! register block, disconnect. The production implementation speaks Modbus TCP
//! through `tokio-modbus`; tests substitute an in-memory implementation.
//!
//! A transport owns at most one connection. Read faults drop the connection so
//! the next cycle reopens it; a Modbus exception response keeps it, since the
//! head answered and the fault is in the request, not the link.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::registry::{DeviceDescriptor, ReadMode, ReadQuality};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {detail}")]
    Connect { endpoint: String, detail: String },
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("link failure: {0}")]
    Link(String),
    #[error("protocol fault: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Device-level quality a failed cycle is recorded with.
    pub fn quality(&self) -> ReadQuality {
        match self {
            TransportError::Timeout(_) => ReadQuality::Timeout,
            _ => ReadQuality::CommError,
        }
    }
}

/// One device's view of the wire.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` words starting at `addr` from the given register table,
    /// opening or reopening the connection first as needed.
    async fn read_block(
        &mut self,
        mode: ReadMode,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Release the connection. Always called when a worker exits.
    async fn disconnect(&mut self);
}

/// Modbus TCP transport bound to one scale head.
pub struct ModbusTcpTransport {
    endpoint: String,
    unit: u8,
    read_timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusTcpTransport {
    /// Build a transport for a device, appending `default_port` when the
    /// descriptor address carries no explicit port.
    pub fn for_device(device: &DeviceDescriptor, default_port: u16, read_timeout: Duration) -> Self {
        let endpoint = if device.address.contains(':') {
            device.address.clone()
        } else {
            format!("{}:{}", device.address, default_port)
        };
        Self {
            endpoint,
            unit: device.unit,
            read_timeout,
            ctx: None,
        }
    }

    fn connect_error(&self, detail: impl ToString) -> TransportError {
        TransportError::Connect {
            endpoint: self.endpoint.clone(),
            detail: detail.to_string(),
        }
    }

    /// Open the connection if it is not already open.
    async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if self.ctx.is_some() {
            return Ok(());
        }
        let socket_addr: SocketAddr = self
            .endpoint
            .parse()
            .map_err(|e| self.connect_error(format!("invalid endpoint: {e}")))?;
        let connect = tcp::connect_slave(socket_addr, Slave(self.unit));
        let ctx = match timeout(self.read_timeout, connect).await {
            Err(_) => return Err(self.connect_error("connect timed out")),
            Ok(Err(e)) => return Err(self.connect_error(e)),
            Ok(Ok(ctx)) => ctx,
        };
        self.ctx = Some(ctx);
        Ok(())
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn read_block(
        &mut self,
        mode: ReadMode,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.ensure_connected().await?;
        let deadline = self.read_timeout;
        let Some(ctx) = self.ctx.as_mut() else {
            return Err(TransportError::Link("no open connection".into()));
        };
        let read = async {
            match mode {
                ReadMode::Holding => ctx.read_holding_registers(addr, count).await,
                ReadMode::Input => ctx.read_input_registers(addr, count).await,
            }
        };
        match timeout(deadline, read).await {
            Err(_) => {
                self.ctx = None;
                Err(TransportError::Timeout(deadline))
            }
            Ok(Err(e)) => {
                self.ctx = None;
                Err(TransportError::Link(e.to_string()))
            }
            Ok(Ok(Err(exception))) => {
                Err(TransportError::Protocol(format!("modbus exception: {exception:?}")))
            }
            Ok(Ok(Ok(words))) => Ok(words),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let _ = ctx.disconnect().await;
        }
    }
}

/// Builds one transport per spawned worker.
pub trait TransportFactory: Send + Sync {
    fn create(&self, device: &DeviceDescriptor) -> Box<dyn RegisterTransport>;
}

/// Production factory handing out [`ModbusTcpTransport`]s.
pub struct TcpTransportFactory {
    pub default_port: u16,
    pub read_timeout: Duration,
}

impl TransportFactory for TcpTransportFactory {
    fn create(&self, device: &DeviceDescriptor) -> Box<dyn RegisterTransport> {
        Box::new(ModbusTcpTransport::for_device(
            device,
            self.default_port,
            self.read_timeout,
        ))
    }
}
