/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/


//! Test harness for `event-router`: an in-process loopback network that
//! implements the federation transport, scripted protocol clients and
//! logging setup.

mod loopback;
mod test_client;

pub use loopback::{LoopbackNetwork, LoopbackSession, LoopbackTransport};
pub use test_client::{TestClient, DEFAULT_WAIT};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly `tracing` subscriber once per process.
/// Filtering follows `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
