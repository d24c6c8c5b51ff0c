// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use futures::stream::BoxStream;

use crate::errors::DatastoreError;
use crate::kvpair::KVPair;

/// Where to start a watch from. With no revision, the watch starts from the current state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub revision: Option<String>,
}

#[derive(Debug)]
pub enum WatchEvent {
    Added(KVPair),
    Modified(KVPair),
    Deleted(KVPair),
    Error(DatastoreError),
}

/// Stream of watch events. The stream ends when the underlying watch terminates; restarting
/// it is up to the consumer.
pub type WatchStream = BoxStream<'static, WatchEvent>;
