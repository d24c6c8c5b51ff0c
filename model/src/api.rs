// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The contract between the generic datastore client and a datastore backend.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Display;

use crate::errors::DatastoreError;
use crate::key::Key;
use crate::kvpair::{KVPair, KVPairList};
use crate::list::ListOptions;
use crate::watch::{WatchOptions, WatchStream};

#[async_trait]
pub trait Backend: Send + Sync {
    /// Create an entry. Fails if the entry already exists.
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError>;

    /// Update an existing entry. Fails if the entry does not exist or if the revision of
    /// `kvp` is stale.
    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError>;

    /// Create or replace an entry, regardless of whether it exists.
    async fn apply(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError>;

    /// Delete an entry by key, checking `revision` if one is given.
    async fn delete(&self, key: &Key, revision: Option<&str>) -> Result<KVPair, DatastoreError>;

    /// Delete an entry the caller already holds, checking its revision.
    async fn delete_kvp(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError>;

    /// Get an entry. Fails if the entry does not exist.
    async fn get(&self, key: &Key, revision: Option<&str>) -> Result<KVPair, DatastoreError>;

    /// List entries. An empty list is not an error.
    async fn list(
        &self,
        list: &ListOptions,
        revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError>;

    /// Start watching the entries matched by `list`.
    async fn watch(
        &self,
        list: &ListOptions,
        options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError>;

    /// Make sure the datastore is ready to be used.
    async fn ensure_initialized(&self) -> Result<(), DatastoreError>;

    /// Remove all data that can be created through this backend. Best effort: individual
    /// failures are collected in the returned report and never abort the cleanup.
    async fn clean(&self) -> Result<CleanReport, DatastoreError>;

    /// Release the resources held by the backend.
    async fn close(&self) -> Result<(), DatastoreError>;
}

/// The phase of a cleanup an error occurred in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CleanStep {
    ListResources,
    DeleteResource,
    ListIpam,
    DeleteIpam,
    ListNodes,
    ResetNode,
    DeleteIpamConfig,
}

impl Display for CleanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self {
            CleanStep::ListResources => "list resources",
            CleanStep::DeleteResource => "delete resource",
            CleanStep::ListIpam => "list IPAM resources",
            CleanStep::DeleteIpam => "delete IPAM resource",
            CleanStep::ListNodes => "list nodes",
            CleanStep::ResetNode => "reset node",
            CleanStep::DeleteIpamConfig => "delete IPAM config",
        };
        f.write_str(step)
    }
}

/// A single failed cleanup action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CleanFailure {
    pub step: CleanStep,
    pub target: String,
    pub error: String,
}

/// Outcome of [`Backend::clean`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub failures: Vec<CleanFailure>,
}

impl CleanReport {
    pub fn record(&mut self, step: CleanStep, target: impl Display, error: &DatastoreError) {
        self.failures.push(CleanFailure {
            step,
            target: target.to_string(),
            error: error.to_string(),
        });
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failures recorded for one step.
    pub fn failures_in(&self, step: CleanStep) -> impl Iterator<Item = &CleanFailure> {
        self.failures.iter().filter(move |f| f.step == step)
    }
}
