// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Datastore backend storing its data in a Kubernetes cluster: custom resources, built-in
//! objects and values derived from cluster state, behind a single key/value interface.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod clean;
pub mod client;
pub mod config;
pub mod factory;
pub mod ratelimit;
pub mod registry;
pub mod resources;
pub mod synth;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// re-exports
pub use client::KubeClient;
pub use config::{ConfigError, DatastoreConfig};
pub use factory::{ClientFactoryError, ClientSet};
pub use registry::{Registry, RegistryBuilder};
pub use resources::{ResourceClient, SharedResourceClient};
