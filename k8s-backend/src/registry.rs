// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Routing tables from keys and list queries to resource clients.

use std::collections::HashMap;
use tracing::debug;

use model::{Key, KeyType, ListOptions, ListType};

use crate::resources::SharedResourceClient;

/// Collects registrations. Consumed by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    by_kind: HashMap<String, SharedResourceClient>,
    by_key_type: HashMap<KeyType, SharedResourceClient>,
    by_list_type: HashMap<ListType, SharedResourceClient>,
}

impl RegistryBuilder {
    /// Register a client. Generic resource registrations are stored under `kind`; any
    /// other key type is stored under the key type and, if given, the list type. The
    /// list type of a generic registration is not used: generic lists route by kind.
    /// A later registration replaces an earlier one.
    pub fn register(
        &mut self,
        key_type: KeyType,
        list_type: Option<ListType>,
        kind: &str,
        client: SharedResourceClient,
    ) -> &mut Self {
        if key_type == KeyType::Resource {
            debug!("Registering resource client for kind {kind}");
            if self.by_kind.insert(kind.to_owned(), client).is_some() {
                debug!("Replaced resource client for kind {kind}");
            }
        } else {
            debug!("Registering resource client for {key_type:?} keys ({kind})");
            if let Some(list_type) = list_type {
                self.by_list_type.insert(list_type, client.clone());
            }
            self.by_key_type.insert(key_type, client);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            by_kind: self.by_kind,
            by_key_type: self.by_key_type,
            by_list_type: self.by_list_type,
        }
    }
}

/// Immutable routing tables. Generic kinds and narrow key and list types are separate
/// namespaces.
pub struct Registry {
    by_kind: HashMap<String, SharedResourceClient>,
    by_key_type: HashMap<KeyType, SharedResourceClient>,
    by_list_type: HashMap<ListType, SharedResourceClient>,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    #[must_use]
    pub fn for_kind(&self, kind: &str) -> Option<&SharedResourceClient> {
        self.by_kind.get(kind)
    }

    #[must_use]
    pub fn for_key(&self, key: &Key) -> Option<&SharedResourceClient> {
        match key {
            Key::Resource(key) => self.for_kind(&key.kind),
            _ => self.by_key_type.get(&key.key_type()),
        }
    }

    #[must_use]
    pub fn for_list(&self, list: &ListOptions) -> Option<&SharedResourceClient> {
        match list {
            ListOptions::Resource(list) => self.for_kind(&list.kind),
            _ => self.by_list_type.get(&list.list_type()),
        }
    }

    /// The registered generic kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.by_kind.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MemoryClient;
    use model::{
        BlockAffinityKey, BlockAffinityListOptions, BlockKey, BlockListOptions, IpamConfigKey,
        ResourceKey, ResourceListOptions,
    };
    use std::sync::Arc;

    fn same(a: Option<&SharedResourceClient>, b: &SharedResourceClient) -> bool {
        a.is_some_and(|a| Arc::ptr_eq(a, b))
    }

    #[test]
    fn test_generic_lookup() {
        let pools: SharedResourceClient = Arc::new(MemoryClient::new("IPPool"));
        let mut builder = Registry::builder();
        builder.register(
            KeyType::Resource,
            Some(ListType::Resource),
            "IPPool",
            pools.clone(),
        );
        let registry = builder.build();

        assert!(same(registry.for_kind("IPPool"), &pools));
        assert!(same(
            registry.for_key(&ResourceKey::new("IPPool", "default").into()),
            &pools
        ));
        assert!(same(
            registry.for_list(&ResourceListOptions::kind("IPPool").into()),
            &pools
        ));
        assert!(registry.for_kind("Tier").is_none());
        assert!(
            registry
                .for_key(&ResourceKey::new("Tier", "default").into())
                .is_none()
        );
        // a generic registration does not populate the narrow tables
        assert!(
            registry
                .for_list(&BlockListOptions::default().into())
                .is_none()
        );
    }

    #[test]
    fn test_narrow_lookup_shares_instances() {
        let affinities: SharedResourceClient = Arc::new(MemoryClient::new("BlockAffinity"));
        let config: SharedResourceClient = Arc::new(MemoryClient::new("IPAMConfig"));
        let mut builder = Registry::builder();
        builder
            .register(KeyType::Resource, None, "BlockAffinity", affinities.clone())
            .register(
                KeyType::BlockAffinity,
                Some(ListType::BlockAffinity),
                "BlockAffinity",
                affinities.clone(),
            )
            .register(KeyType::IpamConfig, None, "IPAMConfig", config.clone());
        let registry = builder.build();

        let key = BlockAffinityKey::host("10.0.0.0/26".parse().unwrap(), "node-1");
        assert!(same(registry.for_key(&key.into()), &affinities));
        assert!(same(
            registry.for_list(&BlockAffinityListOptions::default().into()),
            &affinities
        ));
        assert!(same(registry.for_kind("BlockAffinity"), &affinities));
        assert!(same(registry.for_key(&IpamConfigKey.into()), &config));

        // narrow keys without a registration
        let block = BlockKey {
            cidr: "10.0.0.0/26".parse().unwrap(),
        };
        assert!(registry.for_key(&block.into()).is_none());
        assert_eq!(registry.kinds(), vec!["BlockAffinity"]);
    }
}
