// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Values computed from cluster state rather than read from a stored object.

use async_trait::async_trait;
use ipnet::IpNet;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

use model::kinds::{HOST_CONFIG_TUNNEL_ADDR, KIND_NODE};
use model::{
    DatastoreError, HostConfigKey, KVPair, KVPairList, Key, ListOptions, Operation, ResourceKey,
    ResourceListOptions, WatchOptions, WatchStream,
};

use crate::ratelimit::RateLimiter;
use crate::resources::{ResourceClient, translate_error};

/// Read access to the cluster's nodes.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn get_node(&self, name: &str) -> Result<Node, DatastoreError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, DatastoreError>;
}

/// Reads nodes from the API server.
pub struct ApiNodeSource {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl ApiNodeSource {
    #[must_use]
    pub fn new(client: Client, limiter: Arc<RateLimiter>) -> Self {
        Self { client, limiter }
    }
}

#[async_trait]
impl NodeSource for ApiNodeSource {
    async fn get_node(&self, name: &str) -> Result<Node, DatastoreError> {
        self.limiter.acquire().await;
        Api::<Node>::all(self.client.clone())
            .get(name)
            .await
            .map_err(|e| {
                translate_error(e, Key::from(ResourceKey::new(KIND_NODE, name)), Operation::Get)
            })
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, DatastoreError> {
        self.limiter.acquire().await;
        let nodes = Api::<Node>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|e| {
                translate_error(
                    e,
                    ListOptions::from(ResourceListOptions::kind(KIND_NODE)),
                    Operation::List,
                )
            })?;
        Ok(nodes.items)
    }
}

/// The tunnel address of a node: the first host address of its IPv4 pod CIDR. Nodes
/// without a usable IPv4 pod CIDR have none.
#[must_use]
pub fn tunnel_address(node: &Node) -> Option<KVPair> {
    let name = node.name_any();
    let pod_cidr = node
        .spec
        .as_ref()
        .and_then(|spec| spec.pod_cidr.as_deref())
        .unwrap_or_default();
    if pod_cidr.is_empty() {
        warn!("Node {name} does not have a pod CIDR for HostConfig");
        return None;
    }
    let cidr: IpNet = match pod_cidr.parse() {
        Ok(cidr) => cidr,
        Err(e) => {
            warn!("Node {name} has an invalid pod CIDR '{pod_cidr}' for HostConfig: {e}");
            return None;
        }
    };
    let IpNet::V4(cidr) = cidr else {
        warn!("Node {name} has an IPv6 pod CIDR '{pod_cidr}', no tunnel address");
        return None;
    };
    let mut octets = cidr.network().octets();
    octets[3] = octets[3].wrapping_add(1);
    let address = Ipv4Addr::from(octets);
    Some(KVPair::new(
        HostConfigKey {
            hostname: name,
            name: HOST_CONFIG_TUNNEL_ADDR.to_owned(),
        },
        Value::String(address.to_string()),
    ))
}

/// Serves host configuration values derived from the nodes.
pub struct HostConfigClient {
    nodes: Arc<dyn NodeSource>,
}

impl HostConfigClient {
    #[must_use]
    pub fn new(nodes: Arc<dyn NodeSource>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl ResourceClient for HostConfigClient {
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        Err(DatastoreError::not_supported(
            kvp.key.clone(),
            Operation::Create,
        ))
    }

    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        Err(DatastoreError::not_supported(
            kvp.key.clone(),
            Operation::Update,
        ))
    }

    async fn delete(
        &self,
        key: &Key,
        _revision: Option<&str>,
        _uid: Option<&str>,
    ) -> Result<KVPair, DatastoreError> {
        Err(DatastoreError::not_supported(key.clone(), Operation::Delete))
    }

    async fn get(&self, key: &Key, _revision: Option<&str>) -> Result<KVPair, DatastoreError> {
        let Key::HostConfig(host_config) = key else {
            return Err(DatastoreError::not_supported(key.clone(), Operation::Get));
        };
        if host_config.name != HOST_CONFIG_TUNNEL_ADDR {
            return Err(DatastoreError::ResourceDoesNotExist {
                identifier: key.clone().into(),
            });
        }
        let node = self.nodes.get_node(&host_config.hostname).await?;
        tunnel_address(&node).ok_or_else(|| DatastoreError::ResourceDoesNotExist {
            identifier: key.clone().into(),
        })
    }

    async fn list(
        &self,
        list: &ListOptions,
        revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError> {
        let ListOptions::HostConfig(opts) = list else {
            return Err(DatastoreError::not_supported(list.clone(), Operation::List));
        };
        if let Some(name) = &opts.name
            && name != HOST_CONFIG_TUNNEL_ADDR
        {
            debug!("No synthesized host config named {name}");
            return Ok(KVPairList::empty(revision));
        }
        let nodes = match &opts.hostname {
            Some(hostname) => vec![self.nodes.get_node(hostname).await?],
            None => self.nodes.list_nodes().await?,
        };
        Ok(KVPairList {
            kvps: nodes.iter().filter_map(tunnel_address).collect(),
            revision: revision.map(str::to_owned),
        })
    }

    async fn watch(
        &self,
        list: &ListOptions,
        _options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError> {
        Err(DatastoreError::not_supported(list.clone(), Operation::Watch))
    }
}

/// Serves the ready flag. The datastore is always ready.
pub struct ReadyFlagClient;

#[async_trait]
impl ResourceClient for ReadyFlagClient {
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        Err(DatastoreError::not_supported(
            kvp.key.clone(),
            Operation::Create,
        ))
    }

    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        Err(DatastoreError::not_supported(
            kvp.key.clone(),
            Operation::Update,
        ))
    }

    async fn delete(
        &self,
        key: &Key,
        _revision: Option<&str>,
        _uid: Option<&str>,
    ) -> Result<KVPair, DatastoreError> {
        Err(DatastoreError::not_supported(key.clone(), Operation::Delete))
    }

    async fn get(&self, key: &Key, _revision: Option<&str>) -> Result<KVPair, DatastoreError> {
        match key {
            Key::ReadyFlag(_) => Ok(KVPair::new(key.clone(), Value::Bool(true))),
            _ => Err(DatastoreError::not_supported(key.clone(), Operation::Get)),
        }
    }

    async fn list(
        &self,
        list: &ListOptions,
        _revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError> {
        Err(DatastoreError::not_supported(list.clone(), Operation::List))
    }

    async fn watch(
        &self,
        list: &ListOptions,
        _options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError> {
        Err(DatastoreError::not_supported(list.clone(), Operation::Watch))
    }
}
