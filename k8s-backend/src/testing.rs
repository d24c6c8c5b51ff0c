// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory resource client, for assembling a backend without a cluster.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

use model::{
    DatastoreError, Identifier, KVPair, KVPairList, Key, ListOptions, Operation, WatchEvent,
    WatchOptions, WatchStream,
};

/// A request served by a [`MemoryClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub identifier: String,
    pub revision: Option<String>,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<Key, KVPair>,
    next_revision: u64,
    calls: Vec<Call>,
    failures: HashSet<(Operation, String)>,
}

/// Stores pairs in a map and hands out increasing revisions. Stale revisions are
/// rejected like the API server does. Failures can be injected per operation and
/// key (or list query), matched on their display form.
pub struct MemoryClient {
    kind: String,
    state: Mutex<State>,
}

fn list_matches(list: &ListOptions, key: &Key) -> bool {
    match (list, key) {
        (ListOptions::Resource(list), Key::Resource(key)) => {
            list.kind == key.kind
                && list
                    .namespace
                    .as_ref()
                    .is_none_or(|ns| key.namespace.as_ref() == Some(ns))
                && list.name.as_ref().is_none_or(|name| *name == key.name)
        }
        (ListOptions::Block(_), Key::Block(_))
        | (ListOptions::BlockAffinity(_), Key::BlockAffinity(_))
        | (ListOptions::IpamHandle(_), Key::IpamHandle(_))
        | (ListOptions::HostConfig(_), Key::HostConfig(_)) => true,
        _ => false,
    }
}

fn injected(identifier: impl Into<Identifier>) -> DatastoreError {
    DatastoreError::Client {
        identifier: identifier.into(),
        source: "injected failure".into(),
    }
}

impl MemoryClient {
    #[must_use]
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            state: Mutex::new(State {
                next_revision: 1,
                ..State::default()
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Store `kvp` as is, bypassing the request log. Returns the stored pair.
    pub fn insert(&self, kvp: KVPair) -> KVPair {
        let mut state = self.state.lock();
        let stored = Self::stamp(&mut state, kvp);
        state.entries.insert(stored.key.clone(), stored.clone());
        stored
    }

    /// Make `operation` fail for the key or list query displayed as `identifier`.
    pub fn fail(&self, operation: Operation, identifier: impl ToString) {
        self.state
            .lock()
            .failures
            .insert((operation, identifier.to_string()));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<KVPair> {
        self.state.lock().entries.values().cloned().collect()
    }

    #[must_use]
    pub fn stored(&self, key: &Key) -> Option<KVPair> {
        self.state.lock().entries.get(key).cloned()
    }

    fn stamp(state: &mut State, mut kvp: KVPair) -> KVPair {
        kvp.revision = Some(state.next_revision.to_string());
        if kvp.uid.is_none() {
            kvp.uid = Some(format!("uid-{}", state.next_revision));
        }
        state.next_revision += 1;
        kvp
    }

    /// Log a request and check for an injected failure.
    fn record(
        state: &mut State,
        operation: Operation,
        identifier: &Identifier,
        revision: Option<&str>,
    ) -> Result<(), DatastoreError> {
        let display = identifier.to_string();
        state.calls.push(Call {
            operation,
            identifier: display.clone(),
            revision: revision.map(str::to_owned),
        });
        if state.failures.contains(&(operation, display)) {
            return Err(injected(identifier.clone()));
        }
        Ok(())
    }

    fn check_revision(
        stored: &KVPair,
        key: &Key,
        revision: Option<&str>,
    ) -> Result<(), DatastoreError> {
        match revision {
            Some(revision) if stored.revision.as_deref() != Some(revision) => {
                Err(DatastoreError::ResourceUpdateConflict {
                    identifier: key.clone().into(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl crate::resources::ResourceClient for MemoryClient {
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        let mut state = self.state.lock();
        let identifier = Identifier::Key(kvp.key.clone());
        Self::record(
            &mut state,
            Operation::Create,
            &identifier,
            kvp.revision.as_deref(),
        )?;
        if state.entries.contains_key(&kvp.key) {
            return Err(DatastoreError::ResourceAlreadyExists { identifier });
        }
        let stored = Self::stamp(&mut state, kvp.clone());
        state.entries.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        let mut state = self.state.lock();
        let identifier = Identifier::Key(kvp.key.clone());
        Self::record(
            &mut state,
            Operation::Update,
            &identifier,
            kvp.revision.as_deref(),
        )?;
        let Some(current) = state.entries.get(&kvp.key) else {
            return Err(DatastoreError::ResourceDoesNotExist { identifier });
        };
        Self::check_revision(current, &kvp.key, kvp.revision.as_deref())?;
        let mut next = kvp.clone();
        next.uid.clone_from(&current.uid);
        let stored = Self::stamp(&mut state, next);
        state.entries.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        key: &Key,
        revision: Option<&str>,
        uid: Option<&str>,
    ) -> Result<KVPair, DatastoreError> {
        let mut state = self.state.lock();
        let identifier = Identifier::Key(key.clone());
        Self::record(&mut state, Operation::Delete, &identifier, revision)?;
        let Some(current) = state.entries.get(key) else {
            return Err(DatastoreError::ResourceDoesNotExist { identifier });
        };
        Self::check_revision(current, key, revision)?;
        if uid.is_some() && current.uid.as_deref() != uid {
            return Err(DatastoreError::ResourceUpdateConflict { identifier });
        }
        state
            .entries
            .remove(key)
            .ok_or(DatastoreError::ResourceDoesNotExist { identifier })
    }

    async fn get(&self, key: &Key, revision: Option<&str>) -> Result<KVPair, DatastoreError> {
        let mut state = self.state.lock();
        let identifier = Identifier::Key(key.clone());
        Self::record(&mut state, Operation::Get, &identifier, revision)?;
        state
            .entries
            .get(key)
            .cloned()
            .ok_or(DatastoreError::ResourceDoesNotExist { identifier })
    }

    async fn list(
        &self,
        list: &ListOptions,
        revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError> {
        let mut state = self.state.lock();
        let identifier = Identifier::List(list.clone());
        Self::record(&mut state, Operation::List, &identifier, revision)?;
        Ok(KVPairList {
            kvps: state
                .entries
                .values()
                .filter(|kvp| list_matches(list, &kvp.key))
                .cloned()
                .collect(),
            revision: Some((state.next_revision - 1).to_string()),
        })
    }

    /// Replays the current entries as additions, then ends.
    async fn watch(
        &self,
        list: &ListOptions,
        options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError> {
        let mut state = self.state.lock();
        let identifier = Identifier::List(list.clone());
        Self::record(
            &mut state,
            Operation::Watch,
            &identifier,
            options.revision.as_deref(),
        )?;
        let events: Vec<WatchEvent> = state
            .entries
            .values()
            .filter(|kvp| list_matches(list, &kvp.key))
            .cloned()
            .map(WatchEvent::Added)
            .collect();
        Ok(futures::stream::iter(events).boxed())
    }
}
