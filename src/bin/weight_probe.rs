// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Diagnostic probe for a single scale head
//!
//! Connects to one device, polls its register block on a fixed period and
//! prints the decoded reading until Ctrl-C. No persistence, no stabilization;
//! this is the tool you point at a head to check wiring, byte order and
//! calibration before adding it to the fleet configuration.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use rust_weighbridge::decoding::{parse_scalar, ByteOrder, ScalarFormat};
use rust_weighbridge::registry::{DeviceDescriptor, ReadMode};
use rust_weighbridge::transport::{ModbusTcpTransport, RegisterTransport};

/// Read one scale head's registers over Modbus TCP
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Device IP address
    #[arg(long)]
    address: String,

    /// Modbus TCP port
    #[arg(long, default_value_t = 502)]
    port: u16,

    /// Modbus unit identifier
    #[arg(long, default_value_t = 1)]
    unit: u8,

    /// Register table to read: holding or input
    #[arg(long, default_value = "holding")]
    mode: ReadMode,

    /// First register of the block
    #[arg(long, default_value_t = 0)]
    addr: u16,

    /// Number of registers to read
    #[arg(long, default_value_t = 2)]
    count: u16,

    /// Scalar format: u16, s16, u32, s32 or float32
    #[arg(long, default_value = "float32")]
    format: ScalarFormat,

    /// Float byte order: ABCD, BADC, CDAB or DCBA
    #[arg(long, default_value = "DCBA")]
    byte_order: ByteOrder,

    /// Linear calibration factor applied to the raw reading
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Linear calibration offset applied after scaling
    #[arg(long, default_value_t = 0.0)]
    offset: f64,

    /// Poll period in milliseconds
    #[arg(long, default_value_t = 200)]
    period_ms: u64,

    /// Connect and read deadline in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let descriptor = DeviceDescriptor {
        id: 0,
        address: args.address.clone(),
        unit: args.unit,
        base_offset: args.addr,
        block_bits: args.count * 16,
        read_mode: args.mode,
        poll_interval_ms: args.period_ms,
        values: Vec::new(),
    };
    let mut transport = ModbusTcpTransport::for_device(
        &descriptor,
        args.port,
        Duration::from_millis(args.timeout_ms),
    );

    println!(
        "Reading {:?} registers {}+{} from {} every {}ms. Ctrl+C to exit.",
        args.mode, args.addr, args.count, args.address, args.period_ms
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = transport.read_block(args.mode, args.addr, args.count) => outcome,
        };

        let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
        match outcome {
            Ok(words) => {
                match parse_scalar(&words, args.format, args.byte_order, args.scale, args.offset)
                {
                    Ok(value) => println!("{stamp}  weight={value:.3}  raw={words:?}"),
                    Err(err) => println!("{stamp}  [ERR] {err}"),
                }
            }
            Err(err) => println!("{stamp}  [ERR] {err}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(Duration::from_millis(args.period_ms)) => {}
        }
    }

    transport.disconnect().await;
    Ok(())
}
