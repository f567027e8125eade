// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line entry point for `sheet-export`.
//!
//! Exit status: 0 on success, 1 on configuration or export failure, 130 when
//! interrupted.

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use sheet_export::application::report::write_report;
use sheet_export::application::runtime::RuntimeContext;
use sheet_export::config::{AppConfig, CliArgs, ExportConfig};
use sheet_export::domain::cancellation::CancellationToken;
use sheet_export::domain::errors::Result;
use std::process;

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    // 1. Parse Arguments
    let args = CliArgs::parse();

    // 2. Load Config: file, then .env and process environment, then flags
    if dotenv::from_filename(&args.env_file).is_err() && args.env_file != ".env" {
        eprintln!("Environment file {} could not be loaded", args.env_file);
    }
    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
            error!("Invalid configuration: {}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    // 3. Initialize Logging
    let level = config.log_level.to_string().to_lowercase();
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    for line in config.summary_lines() {
        info!("{}", line);
    }

    // 4. Cancellation on Ctrl-C
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current batch...");
        handler_token.cancel();
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    // 5. Initialize Hexagonal Components
    let runtime = match RuntimeContext::init(&config) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to initialize runtime: {}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    // 6. Run Orchestrator
    info!("Starting export of {}...", config.table);
    let session = runtime.orchestrator(cancel).run_export(&config);

    if let Some(path) = &args.report {
        if let Err(e) = write_report(path, &session) {
            error!("Failed to write report {}: {}", path.display(), e);
        }
    }

    let summary = session.summary();
    match &summary.artifact_path {
        Some(path) => info!("Output: {}", path.display()),
        None => info!("Output: none"),
    }

    if summary.cancelled {
        process::exit(EXIT_INTERRUPTED);
    }
    if !summary.success {
        process::exit(EXIT_FAILURE);
    }
}

fn load_config(args: &CliArgs) -> Result<ExportConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    config.merge_env(|key| std::env::var(key).ok())?;
    config.merge_cli(args)?;
    config.resolve()
}
