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

mod config;

use crate::config::{Config, ConfigError};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(about = "Validates an event router configuration")]
struct RouterArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
    /// Host names to resolve to federation classes. May be repeated.
    #[arg(short, long, value_name = "HOST")]
    resolve: Vec<String>,
}

fn main() -> Result<(), ConfigError> {
    let _ = tracing_subscriber::fmt::try_init();

    let args = RouterArgs::parse();
    info!(config = %args.config, "validating router configuration");

    let report = Config::load(&args.config)
        .and_then(|config| config.validate(&args.resolve))
        .inspect_err(|err| error!(config = %args.config, err = %err, "configuration rejected"))?;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => error!(err = %err, "unable to render configuration report"),
    }

    Ok(())
}
