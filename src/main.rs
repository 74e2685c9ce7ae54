// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the weighbridge datalogger service

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;

use rust_weighbridge::config::{output_config_schema, Config};
use rust_weighbridge::persistence::LogSink;
use rust_weighbridge::registry::DeviceRegistry;
use rust_weighbridge::schema::ConfigSchemaSource;
use rust_weighbridge::supervisor::{Supervisor, SupervisorSettings};
use rust_weighbridge::transport::TcpTransportFactory;

/// Weighbridge datalogger polling scale heads over Modbus TCP
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    if args.show_config_schema {
        return output_config_schema();
    }

    let config = Config::from_file(&args.config)?;
    info!(
        "configuration loaded from {:?} ({} devices)",
        args.config,
        config.devices.len()
    );

    // The process lifetime signal: Ctrl-C cancels the whole task tree.
    let root = CancellationToken::new();
    let signal_token = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let registry = Arc::new(DeviceRegistry::new());
    let source = Arc::new(ConfigSchemaSource::new(
        config.devices.clone(),
        config.service.read_mode_filter,
    ));
    let sink = Arc::new(LogSink);
    let transports = Arc::new(TcpTransportFactory {
        default_port: config.transport.default_port,
        read_timeout: Duration::from_millis(config.transport.read_timeout_ms),
    });
    let settings = SupervisorSettings::from_config(&config);

    let supervisor = Supervisor::new(registry, source, sink, transports, settings, root);
    supervisor.run().await
}
