// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weighbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Weighbridge datalogger library
//!
//! Polls a fleet of scale heads over Modbus TCP, decodes their register
//! blocks into typed values, debounces the weight reading into stable-weight
//! events and hands those to a persistence sink.

pub mod config;
pub mod decoding;
pub mod persistence;
pub mod registry;
pub mod schema;
pub mod stabilization;
pub mod supervisor;
pub mod transport;
pub mod worker;
