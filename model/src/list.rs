// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! List queries. These mirror the key shapes in [`crate::key`].

use serde::Serialize;
use std::fmt::Display;

/// Lists resources of one kind, optionally restricted to a namespace and/or a name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceListOptions {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

impl ResourceListOptions {
    #[must_use]
    pub fn kind(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            namespace: None,
            name: None,
        }
    }
}

/// Lists IPAM blocks, optionally restricted to one IP version (4 or 6).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BlockListOptions {
    pub ip_version: Option<u8>,
}

/// Lists block affinities, optionally restricted to one host, IP version or affinity type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BlockAffinityListOptions {
    pub host: Option<String>,
    pub ip_version: Option<u8>,
    pub affinity_type: Option<String>,
}

/// Lists all IPAM handles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct IpamHandleListOptions;

/// Lists per-host configuration values. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct HostConfigListOptions {
    pub hostname: Option<String>,
    pub name: Option<String>,
}

/// A list query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ListOptions {
    Resource(ResourceListOptions),
    Block(BlockListOptions),
    BlockAffinity(BlockAffinityListOptions),
    IpamHandle(IpamHandleListOptions),
    HostConfig(HostConfigListOptions),
}

/// The discriminant of a [`ListOptions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListType {
    Resource,
    Block,
    BlockAffinity,
    IpamHandle,
    HostConfig,
}

impl ListOptions {
    #[must_use]
    pub fn list_type(&self) -> ListType {
        match self {
            ListOptions::Resource(_) => ListType::Resource,
            ListOptions::Block(_) => ListType::Block,
            ListOptions::BlockAffinity(_) => ListType::BlockAffinity,
            ListOptions::IpamHandle(_) => ListType::IpamHandle,
            ListOptions::HostConfig(_) => ListType::HostConfig,
        }
    }

    /// The namespace the query is restricted to, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            ListOptions::Resource(list) => list.namespace.as_deref(),
            _ => None,
        }
    }
}

impl From<ResourceListOptions> for ListOptions {
    fn from(list: ResourceListOptions) -> Self {
        ListOptions::Resource(list)
    }
}
impl From<BlockListOptions> for ListOptions {
    fn from(list: BlockListOptions) -> Self {
        ListOptions::Block(list)
    }
}
impl From<BlockAffinityListOptions> for ListOptions {
    fn from(list: BlockAffinityListOptions) -> Self {
        ListOptions::BlockAffinity(list)
    }
}
impl From<IpamHandleListOptions> for ListOptions {
    fn from(list: IpamHandleListOptions) -> Self {
        ListOptions::IpamHandle(list)
    }
}
impl From<HostConfigListOptions> for ListOptions {
    fn from(list: HostConfigListOptions) -> Self {
        ListOptions::HostConfig(list)
    }
}

impl Display for ListOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListOptions::Resource(list) => {
                write!(f, "{}(", list.kind)?;
                if let Some(ns) = &list.namespace {
                    write!(f, "ns={ns}")?;
                }
                if let Some(name) = &list.name {
                    write!(f, " name={name}")?;
                }
                write!(f, ")")
            }
            ListOptions::Block(list) => write!(f, "Blocks(ipv={:?})", list.ip_version),
            ListOptions::BlockAffinity(list) => write!(
                f,
                "BlockAffinities(host={:?}, ipv={:?})",
                list.host, list.ip_version
            ),
            ListOptions::IpamHandle(_) => write!(f, "IPAMHandles"),
            ListOptions::HostConfig(list) => write!(
                f,
                "HostConfig(node={:?}, name={:?})",
                list.hostname, list.name
            ),
        }
    }
}
