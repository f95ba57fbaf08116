// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Command-line entry point: `serve` (default) plus a `config` subcommand
//! family for inspecting the effective configuration without starting the
//! server.

use clap::{Parser, Subcommand};
use schemars::schema_for;
use tracing::{error, warn};

use crate::config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, default_value = "sidecar.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Starts the sidecar HTTP server.
    Serve,
    /// Inspect configuration without starting the server.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the default configuration as TOML.
    Default,
    /// Print the configuration's JSON Schema.
    Schema,
}

#[allow(clippy::disallowed_macros)]
async fn handle_serve_command(config_path: &str) {
    let load_result = match config::load(config_path) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        },
    };

    let _log_guard = match crate::logging::init_logging(&load_result.config.log) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            std::process::exit(1);
        },
    };

    if let Some(missing) = &load_result.file_missing {
        warn!(config_path = %missing, "config file not found, using defaults");
    }

    if let Err(err) = crate::server::run(load_result.config).await {
        error!(error = %err, "sidecar server exited with an error");
        std::process::exit(1);
    }
}

#[allow(clippy::disallowed_macros)]
fn handle_config_default_command() {
    match config::generate_default() {
        Ok(toml) => println!("{toml}"),
        Err(err) => {
            eprintln!("failed to generate default config: {err}");
            std::process::exit(1);
        },
    }
}

#[allow(clippy::disallowed_macros)]
fn handle_config_schema_command() {
    let schema = schema_for!(config::Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("failed to generate config schema: {err}");
            std::process::exit(1);
        },
    }
}

pub async fn handle_command(cli: &Cli) {
    match cli.command.as_ref().unwrap_or(&Commands::Serve) {
        Commands::Serve => handle_serve_command(&cli.config).await,
        Commands::Config(ConfigCommands::Default) => handle_config_default_command(),
        Commands::Config(ConfigCommands::Schema) => handle_config_schema_command(),
    }
}
