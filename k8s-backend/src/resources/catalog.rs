// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kinds this datastore serves and the API resources that store them.

use kube::api::ApiResource;
use kube::core::GroupVersionKind;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use model::kinds::{
    KIND_BGP_CONFIGURATION, KIND_BGP_FILTER, KIND_BGP_PEER, KIND_BLOCK_AFFINITY,
    KIND_CALICO_NODE_STATUS, KIND_CLUSTER_INFORMATION, KIND_FELIX_CONFIGURATION,
    KIND_GLOBAL_NETWORK_POLICY, KIND_GLOBAL_NETWORK_SET, KIND_HOST_ENDPOINT, KIND_IP_POOL,
    KIND_IP_RESERVATION, KIND_IPAM_BLOCK, KIND_IPAM_CONFIG, KIND_IPAM_HANDLE,
    KIND_KUBE_CONTROLLERS_CONFIGURATION, KIND_KUBERNETES_ADMIN_NETWORK_POLICY,
    KIND_KUBERNETES_BASELINE_ADMIN_NETWORK_POLICY, KIND_KUBERNETES_ENDPOINT_SLICE,
    KIND_KUBERNETES_NETWORK_POLICY, KIND_KUBERNETES_SERVICE, KIND_NETWORK_POLICY,
    KIND_NETWORK_SET, KIND_NODE, KIND_PROFILE, KIND_STAGED_GLOBAL_NETWORK_POLICY,
    KIND_STAGED_KUBERNETES_NETWORK_POLICY, KIND_STAGED_NETWORK_POLICY, KIND_TIER,
    KIND_WORKLOAD_ENDPOINT,
};
use model::{KeyType, ListType};

use super::{DynamicResourceClient, NodeClient, SharedResourceClient};
use crate::factory::ClientSet;
use crate::registry::RegistryBuilder;
use crate::synth::{ApiNodeSource, HostConfigClient, ReadyFlagClient};

/// Where the objects of a kind live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backing {
    /// A custom resource of the CRD group, with the same kind name.
    Crd { plural: &'static str },
    /// A resource of the admin network policy group.
    AdminPolicy {
        kind: &'static str,
        plural: &'static str,
    },
    /// A built-in resource.
    BuiltIn {
        group: &'static str,
        version: &'static str,
        kind: &'static str,
        plural: &'static str,
    },
    /// The cluster's nodes.
    Node,
}

#[derive(Clone, Copy, Debug)]
pub struct KindEntry {
    pub kind: &'static str,
    pub backing: Backing,
    pub namespaced: bool,
}

const fn crd(kind: &'static str, plural: &'static str, namespaced: bool) -> KindEntry {
    KindEntry {
        kind,
        backing: Backing::Crd { plural },
        namespaced,
    }
}

/// Every kind addressable through a generic resource key.
pub const CATALOG: &[KindEntry] = &[
    crd(KIND_IP_POOL, "ippools", false),
    crd(KIND_IP_RESERVATION, "ipreservations", false),
    crd(KIND_GLOBAL_NETWORK_POLICY, "globalnetworkpolicies", false),
    crd(KIND_STAGED_GLOBAL_NETWORK_POLICY, "stagedglobalnetworkpolicies", false),
    crd(KIND_NETWORK_POLICY, "networkpolicies", true),
    crd(KIND_STAGED_NETWORK_POLICY, "stagednetworkpolicies", true),
    crd(KIND_STAGED_KUBERNETES_NETWORK_POLICY, "stagedkubernetesnetworkpolicies", true),
    KindEntry {
        kind: KIND_KUBERNETES_NETWORK_POLICY,
        backing: Backing::BuiltIn {
            group: "networking.k8s.io",
            version: "v1",
            kind: "NetworkPolicy",
            plural: "networkpolicies",
        },
        namespaced: true,
    },
    KindEntry {
        kind: KIND_KUBERNETES_ADMIN_NETWORK_POLICY,
        backing: Backing::AdminPolicy {
            kind: "AdminNetworkPolicy",
            plural: "adminnetworkpolicies",
        },
        namespaced: false,
    },
    KindEntry {
        kind: KIND_KUBERNETES_BASELINE_ADMIN_NETWORK_POLICY,
        backing: Backing::AdminPolicy {
            kind: "BaselineAdminNetworkPolicy",
            plural: "baselineadminnetworkpolicies",
        },
        namespaced: false,
    },
    KindEntry {
        kind: KIND_KUBERNETES_ENDPOINT_SLICE,
        backing: Backing::BuiltIn {
            group: "discovery.k8s.io",
            version: "v1",
            kind: "EndpointSlice",
            plural: "endpointslices",
        },
        namespaced: true,
    },
    KindEntry {
        kind: KIND_KUBERNETES_SERVICE,
        backing: Backing::BuiltIn {
            group: "",
            version: "v1",
            kind: "Service",
            plural: "services",
        },
        namespaced: true,
    },
    crd(KIND_GLOBAL_NETWORK_SET, "globalnetworksets", false),
    crd(KIND_NETWORK_SET, "networksets", true),
    crd(KIND_TIER, "tiers", false),
    crd(KIND_BGP_PEER, "bgppeers", false),
    crd(KIND_BGP_CONFIGURATION, "bgpconfigurations", false),
    crd(KIND_BGP_FILTER, "bgpfilters", false),
    crd(KIND_FELIX_CONFIGURATION, "felixconfigurations", false),
    crd(KIND_CLUSTER_INFORMATION, "clusterinformations", false),
    KindEntry {
        kind: KIND_NODE,
        backing: Backing::Node,
        namespaced: false,
    },
    KindEntry {
        kind: KIND_PROFILE,
        backing: Backing::BuiltIn {
            group: "",
            version: "v1",
            kind: "Namespace",
            plural: "namespaces",
        },
        namespaced: false,
    },
    crd(KIND_HOST_ENDPOINT, "hostendpoints", false),
    KindEntry {
        kind: KIND_WORKLOAD_ENDPOINT,
        backing: Backing::BuiltIn {
            group: "",
            version: "v1",
            kind: "Pod",
            plural: "pods",
        },
        namespaced: true,
    },
    crd(
        KIND_KUBE_CONTROLLERS_CONFIGURATION,
        "kubecontrollersconfigurations",
        false,
    ),
    crd(KIND_CALICO_NODE_STATUS, "caliconodestatuses", false),
    crd(KIND_IPAM_CONFIG, "ipamconfigs", false),
    crd(KIND_BLOCK_AFFINITY, "blockaffinities", false),
];

/// Custom resources backing the narrow IPAM keys that have no generic kind of their own.
const IPAM_BLOCKS: KindEntry = crd(KIND_IPAM_BLOCK, "ipamblocks", false);
const IPAM_HANDLES: KindEntry = crd(KIND_IPAM_HANDLE, "ipamhandles", false);

impl KindEntry {
    fn build(&self, clients: &ClientSet, use_pod_cidr: bool) -> SharedResourceClient {
        let (resource, client) = match self.backing {
            Backing::Crd { plural } => (
                clients.crd.resource(self.kind, plural),
                clients.crd.client(),
            ),
            Backing::AdminPolicy { kind, plural } => (
                clients.admin_policy.resource(kind, plural),
                clients.admin_policy.client(),
            ),
            Backing::BuiltIn {
                group,
                version,
                kind,
                plural,
            } => {
                let gvk = GroupVersionKind::gvk(group, version, kind);
                (
                    ApiResource::from_gvk_with_plural(&gvk, plural),
                    clients.core.clone(),
                )
            }
            Backing::Node => {
                return Arc::new(NodeClient::new(
                    clients.core.clone(),
                    clients.limiter.clone(),
                    use_pod_cidr,
                ));
            }
        };
        Arc::new(DynamicResourceClient::new(
            self.kind,
            resource,
            self.namespaced,
            client,
            clients.limiter.clone(),
        ))
    }
}

/// Register the narrow IPAM keys. Block affinities and the IPAM configuration reuse the
/// clients registered for their generic kinds, found in `generic`.
pub(crate) fn register_ipam(
    builder: &mut RegistryBuilder,
    generic: &HashMap<&str, SharedResourceClient>,
    blocks: SharedResourceClient,
    handles: SharedResourceClient,
) {
    debug!("Registering IPAM resource clients");
    match generic.get(KIND_BLOCK_AFFINITY) {
        Some(affinities) => {
            builder.register(
                KeyType::BlockAffinity,
                Some(ListType::BlockAffinity),
                KIND_BLOCK_AFFINITY,
                affinities.clone(),
            );
        }
        None => warn!("No client for {KIND_BLOCK_AFFINITY}, block affinity keys are not served"),
    }
    builder.register(KeyType::Block, Some(ListType::Block), KIND_IPAM_BLOCK, blocks);
    builder.register(
        KeyType::IpamHandle,
        Some(ListType::IpamHandle),
        KIND_IPAM_HANDLE,
        handles,
    );
    match generic.get(KIND_IPAM_CONFIG) {
        Some(config) => {
            builder.register(KeyType::IpamConfig, None, KIND_IPAM_CONFIG, config.clone());
        }
        None => warn!("No client for {KIND_IPAM_CONFIG}, the IPAM configuration is not served"),
    }
}

/// Register a client for every kind of the catalog, the IPAM clients unless IPAM is
/// delegated to the nodes' pod CIDRs, and the synthesized values.
pub fn register_resource_clients(
    builder: &mut RegistryBuilder,
    clients: &ClientSet,
    use_pod_cidr: bool,
) {
    let mut generic = HashMap::with_capacity(CATALOG.len());
    for entry in CATALOG {
        let client = entry.build(clients, use_pod_cidr);
        builder.register(
            KeyType::Resource,
            Some(ListType::Resource),
            entry.kind,
            client.clone(),
        );
        generic.insert(entry.kind, client);
    }

    if use_pod_cidr {
        debug!("IPAM is taken from the nodes' pod CIDRs, IPAM keys are not served");
    } else {
        let blocks = IPAM_BLOCKS.build(clients, use_pod_cidr);
        let handles = IPAM_HANDLES.build(clients, use_pod_cidr);
        register_ipam(builder, &generic, blocks, handles);
    }

    let nodes = Arc::new(ApiNodeSource::new(
        clients.core.clone(),
        clients.limiter.clone(),
    ));
    builder.register(
        KeyType::HostConfig,
        Some(ListType::HostConfig),
        "HostConfig",
        Arc::new(HostConfigClient::new(nodes)),
    );
    builder.register(KeyType::ReadyFlag, None, "ReadyFlag", Arc::new(ReadyFlagClient));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MemoryClient;
    use model::{BlockAffinityKey, BlockKey, IpamConfigKey, IpamHandleKey, ResourceKey};
    use std::collections::HashSet;

    #[test]
    fn test_catalog_kinds_are_unique() {
        let kinds: HashSet<&str> = CATALOG.iter().map(|entry| entry.kind).collect();
        assert_eq!(kinds.len(), CATALOG.len());
        assert_eq!(CATALOG.len(), 28);
        assert!(!kinds.contains(KIND_IPAM_BLOCK));
        assert!(!kinds.contains(KIND_IPAM_HANDLE));
    }

    #[test]
    fn test_namespaced_kinds() {
        let mut namespaced: Vec<&str> = CATALOG
            .iter()
            .filter(|entry| entry.namespaced)
            .map(|entry| entry.kind)
            .collect();
        namespaced.sort_unstable();
        assert_eq!(
            namespaced,
            vec![
                KIND_KUBERNETES_ENDPOINT_SLICE,
                KIND_KUBERNETES_NETWORK_POLICY,
                KIND_KUBERNETES_SERVICE,
                KIND_NETWORK_POLICY,
                KIND_NETWORK_SET,
                KIND_STAGED_KUBERNETES_NETWORK_POLICY,
                KIND_STAGED_NETWORK_POLICY,
                KIND_WORKLOAD_ENDPOINT,
            ]
        );
    }

    #[test]
    fn test_register_ipam() {
        let affinities: SharedResourceClient = Arc::new(MemoryClient::new(KIND_BLOCK_AFFINITY));
        let config: SharedResourceClient = Arc::new(MemoryClient::new(KIND_IPAM_CONFIG));
        let blocks: SharedResourceClient = Arc::new(MemoryClient::new(KIND_IPAM_BLOCK));
        let handles: SharedResourceClient = Arc::new(MemoryClient::new(KIND_IPAM_HANDLE));
        let generic = HashMap::from([
            (KIND_BLOCK_AFFINITY, affinities.clone()),
            (KIND_IPAM_CONFIG, config.clone()),
        ]);

        let mut builder = RegistryBuilder::default();
        register_ipam(&mut builder, &generic, blocks.clone(), handles.clone());
        let registry = builder.build();

        let cidr = "10.0.0.0/26".parse().unwrap();
        let routed = |key: model::Key| registry.for_key(&key).cloned();
        assert!(Arc::ptr_eq(
            &routed(BlockAffinityKey::host(cidr, "node-1").into()).unwrap(),
            &affinities
        ));
        assert!(Arc::ptr_eq(
            &routed(IpamConfigKey.into()).unwrap(),
            &config
        ));
        assert!(Arc::ptr_eq(
            &routed(BlockKey { cidr }.into()).unwrap(),
            &blocks
        ));
        assert!(Arc::ptr_eq(
            &routed(
                IpamHandleKey {
                    handle_id: "h".to_owned()
                }
                .into()
            )
            .unwrap(),
            &handles
        ));
        // the narrow registrations do not leak into the generic table
        assert!(routed(ResourceKey::new(KIND_IPAM_BLOCK, "x").into()).is_none());
    }
}
