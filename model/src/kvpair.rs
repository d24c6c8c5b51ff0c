// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use serde::Serialize;

use crate::key::Key;

/// A datastore entry.
///
/// `revision` is the opaque version token of the backing store. It is required for
/// revision-checked updates and deletes and must be `None` when creating.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KVPair {
    pub key: Key,
    pub value: serde_json::Value,
    pub revision: Option<String>,
    pub uid: Option<String>,
}

impl KVPair {
    #[must_use]
    pub fn new(key: impl Into<Key>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            revision: None,
            uid: None,
        }
    }

    #[must_use]
    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = Some(revision.to_owned());
        self
    }

    /// Copy of this pair carrying only the key and the value.
    #[must_use]
    pub fn without_revision(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            revision: None,
            uid: None,
        }
    }
}

/// The result of a list request.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KVPairList {
    pub kvps: Vec<KVPair>,
    pub revision: Option<String>,
}

impl KVPairList {
    #[must_use]
    pub fn empty(revision: Option<&str>) -> Self {
        Self {
            kvps: vec![],
            revision: revision.map(str::to_owned),
        }
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.kvps.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kvps.is_empty()
    }
}

impl IntoIterator for KVPairList {
    type Item = KVPair;
    type IntoIter = std::vec::IntoIter<KVPair>;
    fn into_iter(self) -> Self::IntoIter {
        self.kvps.into_iter()
    }
}
