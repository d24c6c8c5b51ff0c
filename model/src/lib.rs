// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Generic datastore model: keys, list queries, key/value pairs and the backend contract
//! implemented by datastore drivers.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod errors;
pub mod key;
pub mod kinds;
pub mod kvpair;
pub mod list;
pub mod names;
pub mod watch;

// re-exports
pub use api::{Backend, CleanFailure, CleanReport, CleanStep};
pub use errors::{DatastoreError, Identifier, Operation};
pub use key::{
    BlockAffinityKey, BlockKey, HostConfigKey, IpamConfigKey, IpamHandleKey, Key, KeyType,
    ReadyFlagKey, ResourceKey,
};
pub use kvpair::{KVPair, KVPairList};
pub use list::{
    BlockAffinityListOptions, BlockListOptions, HostConfigListOptions, IpamHandleListOptions,
    ListOptions, ListType, ResourceListOptions,
};
pub use watch::{WatchEvent, WatchOptions, WatchStream};
