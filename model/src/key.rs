// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Datastore keys.
//!
//! Most resources are addressed through the generic [`ResourceKey`], which carries the
//! resource kind. IPAM internals and a few pseudo-config values have their own narrow key
//! types instead. The set of key shapes is closed: [`KeyType`] is the discriminant used to
//! route narrow keys.

use ipnet::IpNet;
use serde::Serialize;
use std::fmt::Display;

/// Key of a versioned resource, identified by kind, optional namespace and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    #[must_use]
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            namespace: None,
            name: name.to_owned(),
        }
    }
    #[must_use]
    pub fn namespaced(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            namespace: Some(namespace.to_owned()),
            name: name.to_owned(),
        }
    }
}

/// Key of an IPAM allocation block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockKey {
    pub cidr: IpNet,
}

/// Affinity type of blocks claimed by a host.
pub const AFFINITY_TYPE_HOST: &str = "host";

/// Key of the affinity between a host and an IPAM block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockAffinityKey {
    pub cidr: IpNet,
    pub host: String,
    pub affinity_type: String,
}

impl BlockAffinityKey {
    #[must_use]
    pub fn host(cidr: IpNet, host: &str) -> Self {
        Self {
            cidr,
            host: host.to_owned(),
            affinity_type: AFFINITY_TYPE_HOST.to_owned(),
        }
    }
}

/// Key of an IPAM handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IpamHandleKey {
    pub handle_id: String,
}

/// Key of the single, global IPAM configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IpamConfigKey;

/// Key of a per-host configuration value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HostConfigKey {
    pub hostname: String,
    pub name: String,
}

/// Key of the datastore readiness flag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReadyFlagKey;

/// A datastore key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Key {
    Resource(ResourceKey),
    Block(BlockKey),
    BlockAffinity(BlockAffinityKey),
    IpamHandle(IpamHandleKey),
    IpamConfig(IpamConfigKey),
    HostConfig(HostConfigKey),
    ReadyFlag(ReadyFlagKey),
}

/// The discriminant of a [`Key`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyType {
    Resource,
    Block,
    BlockAffinity,
    IpamHandle,
    IpamConfig,
    HostConfig,
    ReadyFlag,
}

impl Key {
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Resource(_) => KeyType::Resource,
            Key::Block(_) => KeyType::Block,
            Key::BlockAffinity(_) => KeyType::BlockAffinity,
            Key::IpamHandle(_) => KeyType::IpamHandle,
            Key::IpamConfig(_) => KeyType::IpamConfig,
            Key::HostConfig(_) => KeyType::HostConfig,
            Key::ReadyFlag(_) => KeyType::ReadyFlag,
        }
    }

    /// The namespace of the key, if it addresses a namespaced resource.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Key::Resource(key) => key.namespace.as_deref(),
            _ => None,
        }
    }

    /// The kind, for generic resource keys.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Key::Resource(key) => Some(key.kind.as_str()),
            _ => None,
        }
    }
}

impl From<ResourceKey> for Key {
    fn from(key: ResourceKey) -> Self {
        Key::Resource(key)
    }
}
impl From<BlockKey> for Key {
    fn from(key: BlockKey) -> Self {
        Key::Block(key)
    }
}
impl From<BlockAffinityKey> for Key {
    fn from(key: BlockAffinityKey) -> Self {
        Key::BlockAffinity(key)
    }
}
impl From<IpamHandleKey> for Key {
    fn from(key: IpamHandleKey) -> Self {
        Key::IpamHandle(key)
    }
}
impl From<IpamConfigKey> for Key {
    fn from(key: IpamConfigKey) -> Self {
        Key::IpamConfig(key)
    }
}
impl From<HostConfigKey> for Key {
    fn from(key: HostConfigKey) -> Self {
        Key::HostConfig(key)
    }
}
impl From<ReadyFlagKey> for Key {
    fn from(key: ReadyFlagKey) -> Self {
        Key::ReadyFlag(key)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Resource(key) => match &key.namespace {
                Some(ns) => write!(f, "{}({ns}/{})", key.kind, key.name),
                None => write!(f, "{}({})", key.kind, key.name),
            },
            Key::Block(key) => write!(f, "Block(cidr={})", key.cidr),
            Key::BlockAffinity(key) => write!(
                f,
                "BlockAffinity(cidr={}, host={}, type={})",
                key.cidr, key.host, key.affinity_type
            ),
            Key::IpamHandle(key) => write!(f, "IPAMHandle(id={})", key.handle_id),
            Key::IpamConfig(_) => write!(f, "IPAMConfig(global)"),
            Key::HostConfig(key) => {
                write!(f, "HostConfig(node={}, name={})", key.hostname, key.name)
            }
            Key::ReadyFlag(_) => write!(f, "ReadyFlag"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_type_discriminant() {
        let key: Key = ResourceKey::new("IPPool", "default-ipv4").into();
        assert_eq!(key.key_type(), KeyType::Resource);
        assert_eq!(key.kind(), Some("IPPool"));

        let key: Key = BlockKey {
            cidr: "10.0.0.0/26".parse().unwrap(),
        }
        .into();
        assert_eq!(key.key_type(), KeyType::Block);
        assert_eq!(key.kind(), None);
        assert_eq!(Key::from(ReadyFlagKey).key_type(), KeyType::ReadyFlag);
    }

    #[test]
    fn test_key_display() {
        let key: Key = ResourceKey::namespaced("NetworkPolicy", "prod", "deny-all").into();
        assert_eq!(key.to_string(), "NetworkPolicy(prod/deny-all)");
        assert_eq!(key.namespace(), Some("prod"));

        let key: Key = BlockAffinityKey::host("10.0.0.0/26".parse().unwrap(), "node-1").into();
        assert_eq!(
            key.to_string(),
            "BlockAffinity(cidr=10.0.0.0/26, host=node-1, type=host)"
        );
    }
}
