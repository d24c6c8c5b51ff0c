// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

mod cmdline;

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use k8s_backend::{ClientFactoryError, ConfigError, DatastoreConfig, KubeClient};
use model::{
    Backend, DatastoreError, HostConfigListOptions, ReadyFlagKey, ResourceKey,
    ResourceListOptions,
};

use crate::cmdline::{Cmdline, Command};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to connect to the datastore: {0}")]
    Connect(#[from] ClientFactoryError),
    #[error(transparent)]
    Datastore(#[from] DatastoreError),
    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{filter}': {e}");
        EnvFilter::new(cmdline::DEFAULT_LOG_LEVEL)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cmdline: &Cmdline) -> Result<DatastoreConfig, ConfigError> {
    let mut config = match &cmdline.config {
        Some(path) => DatastoreConfig::from_file(path)?,
        None => {
            debug!("Reading datastore configuration from the environment");
            DatastoreConfig::from_env()?
        }
    };
    cmdline.connection.apply(&mut config);
    Ok(config)
}

fn print<T: Serialize>(output: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

async fn run(cmdline: Cmdline) -> Result<(), CliError> {
    let config = load_config(&cmdline)?;
    let client = KubeClient::new(&config).await?;

    match cmdline.command {
        Command::Ready => {
            client.ensure_initialized().await?;
            print(&client.get(&ReadyFlagKey.into(), None).await?)?;
        }
        Command::Get {
            kind,
            namespace,
            name,
        } => {
            let key = match namespace {
                Some(namespace) => ResourceKey::namespaced(&kind, &namespace, &name),
                None => ResourceKey::new(&kind, &name),
            };
            print(&client.get(&key.into(), None).await?)?;
        }
        Command::List { kind, namespace } => {
            let list = ResourceListOptions {
                namespace,
                ..ResourceListOptions::kind(&kind)
            };
            print(&client.list(&list.into(), None).await?)?;
        }
        Command::HostConfig { hostname, name } => {
            let list = HostConfigListOptions { hostname, name };
            print(&client.list(&list.into(), None).await?)?;
        }
        Command::Clean => {
            let report = client.clean().await?;
            if !report.is_clean() {
                info!("Cleanup finished with {} failures", report.failures.len());
            }
            print(&report)?;
        }
    }
    client.close().await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cmdline = Cmdline::parse();
    init_logging(&cmdline.log_level);

    match run(cmdline).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
