// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Nodes are owned by the cluster. This client only reads them and manages the routing
//! configuration stored in their annotations.

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, PostParams, WatchEvent as ApiWatchEvent, WatchParams};
use kube::{Client, ResourceExt};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use model::kinds::KIND_NODE;
use model::{
    DatastoreError, KVPair, KVPairList, Key, ListOptions, Operation, ResourceKey, WatchEvent,
    WatchOptions, WatchStream,
};

use super::{ResourceClient, translate_error};
use crate::ratelimit::RateLimiter;

pub const ANNOTATION_IPV4_ADDRESS: &str = "projectcalico.org/IPv4Address";
pub const ANNOTATION_IPV6_ADDRESS: &str = "projectcalico.org/IPv6Address";
pub const ANNOTATION_AS_NUMBER: &str = "projectcalico.org/ASNumber";
pub const ANNOTATION_RR_CLUSTER_ID: &str = "projectcalico.org/RouteReflectorClusterID";

/// Routing configuration fields and the annotations they are stored in.
const BGP_FIELDS: [(&str, &str); 4] = [
    ("ipv4Address", ANNOTATION_IPV4_ADDRESS),
    ("ipv6Address", ANNOTATION_IPV6_ADDRESS),
    ("asNumber", ANNOTATION_AS_NUMBER),
    ("routeReflectorClusterID", ANNOTATION_RR_CLUSTER_ID),
];

fn bgp_from_annotations(annotations: &BTreeMap<String, String>) -> Option<Value> {
    let mut bgp = Map::new();
    for (field, annotation) in BGP_FIELDS {
        let Some(value) = annotations.get(annotation) else {
            continue;
        };
        let value = if annotation == ANNOTATION_AS_NUMBER {
            value
                .parse::<u32>()
                .map_or_else(|_| Value::String(value.clone()), Value::from)
        } else {
            Value::String(value.clone())
        };
        bgp.insert(field.to_owned(), value);
    }
    (!bgp.is_empty()).then_some(Value::Object(bgp))
}

/// Rewrite the routing annotations of `annotations` from `bgp`. A missing or null `bgp`
/// removes them all.
fn bgp_to_annotations(
    bgp: Option<&Value>,
    annotations: &mut BTreeMap<String, String>,
) -> Result<(), String> {
    for (_, annotation) in BGP_FIELDS {
        annotations.remove(annotation);
    }
    let bgp = match bgp {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Object(bgp)) => bgp,
        Some(_) => return Err("spec.bgp is not an object".to_owned()),
    };
    for (field, annotation) in BGP_FIELDS {
        match bgp.get(field) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(Value::String(s)) => {
                annotations.insert(annotation.to_owned(), s.clone());
            }
            Some(Value::Number(n)) => {
                annotations.insert(annotation.to_owned(), n.to_string());
            }
            Some(_) => return Err(format!("spec.bgp.{field} is not a string")),
        }
    }
    Ok(())
}

fn node_key(name: &str) -> Key {
    ResourceKey::new(KIND_NODE, name).into()
}

pub(crate) fn node_to_kvp(mut node: Node, use_pod_cidr: bool) -> Result<KVPair, DatastoreError> {
    let name = node.name_any();
    node.metadata.managed_fields = None;

    let mut spec = Map::new();
    if let Some(bgp) = bgp_from_annotations(node.annotations()) {
        spec.insert("bgp".to_owned(), bgp);
    }
    if use_pod_cidr {
        let pod_cidrs = node
            .spec
            .as_ref()
            .and_then(|spec| spec.pod_cidrs.clone())
            .unwrap_or_default();
        spec.insert("podCIDRs".to_owned(), json!(pod_cidrs));
    }
    let metadata = serde_json::to_value(&node.metadata).map_err(|e| {
        DatastoreError::invalid_value(node_key(&name), format!("invalid metadata: {e}"))
    })?;
    Ok(KVPair {
        key: node_key(&name),
        value: json!({ "metadata": metadata, "spec": spec }),
        revision: node.metadata.resource_version.clone(),
        uid: node.metadata.uid.clone(),
    })
}

fn convert_event(
    list: &ListOptions,
    use_pod_cidr: bool,
    event: Result<ApiWatchEvent<Node>, kube::Error>,
) -> Option<WatchEvent> {
    let (node, wrap): (Node, fn(KVPair) -> WatchEvent) = match event {
        Ok(ApiWatchEvent::Added(node)) => (node, WatchEvent::Added),
        Ok(ApiWatchEvent::Modified(node)) => (node, WatchEvent::Modified),
        Ok(ApiWatchEvent::Deleted(node)) => (node, WatchEvent::Deleted),
        Ok(ApiWatchEvent::Bookmark(_)) => return None,
        Ok(ApiWatchEvent::Error(status)) => {
            return Some(WatchEvent::Error(DatastoreError::Client {
                identifier: list.clone().into(),
                source: format!("watch terminated by the API server: {status:?}").into(),
            }));
        }
        Err(e) => {
            return Some(WatchEvent::Error(translate_error(
                e,
                list.clone(),
                Operation::Watch,
            )));
        }
    };
    Some(match node_to_kvp(node, use_pod_cidr) {
        Ok(kvp) => wrap(kvp),
        Err(e) => WatchEvent::Error(e),
    })
}

/// Serves the `Node` kind over the cluster's built-in nodes.
pub struct NodeClient {
    client: Client,
    limiter: Arc<RateLimiter>,
    use_pod_cidr: bool,
}

impl NodeClient {
    #[must_use]
    pub fn new(client: Client, limiter: Arc<RateLimiter>, use_pod_cidr: bool) -> Self {
        Self {
            client,
            limiter,
            use_pod_cidr,
        }
    }

    fn api(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn name<'a>(key: &'a Key, operation: Operation) -> Result<&'a str, DatastoreError> {
        match key {
            Key::Resource(resource) if resource.kind == KIND_NODE => Ok(&resource.name),
            _ => Err(DatastoreError::not_supported(key.clone(), operation)),
        }
    }
}

#[async_trait]
impl ResourceClient for NodeClient {
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        Err(DatastoreError::not_supported(
            kvp.key.clone(),
            Operation::Create,
        ))
    }

    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        let name = Self::name(&kvp.key, Operation::Update)?;
        let api = self.api();
        self.limiter.acquire().await;
        let mut node = api
            .get(name)
            .await
            .map_err(|e| translate_error(e, kvp.key.clone(), Operation::Update))?;

        let bgp = kvp.value.get("spec").and_then(|spec| spec.get("bgp"));
        bgp_to_annotations(bgp, node.annotations_mut())
            .map_err(|reason| DatastoreError::invalid_value(kvp.key.clone(), reason))?;
        if let Some(revision) = &kvp.revision {
            node.metadata.resource_version = Some(revision.clone());
        }

        debug!("Updating routing configuration of node {name}");
        self.limiter.acquire().await;
        let node = api
            .replace(name, &PostParams::default(), &node)
            .await
            .map_err(|e| translate_error(e, kvp.key.clone(), Operation::Update))?;
        node_to_kvp(node, self.use_pod_cidr)
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
        let name = Self::name(key, Operation::Get)?;
        self.limiter.acquire().await;
        let node = self
            .api()
            .get(name)
            .await
            .map_err(|e| translate_error(e, key.clone(), Operation::Get))?;
        node_to_kvp(node, self.use_pod_cidr)
    }

    async fn list(
        &self,
        list: &ListOptions,
        revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError> {
        let ListOptions::Resource(opts) = list else {
            return Err(DatastoreError::not_supported(list.clone(), Operation::List));
        };
        if let Some(name) = &opts.name {
            return match self.get(&node_key(name), revision).await {
                Ok(kvp) => Ok(KVPairList {
                    revision: kvp.revision.clone(),
                    kvps: vec![kvp],
                }),
                Err(e) if e.is_not_found() => Ok(KVPairList::empty(revision)),
                Err(e) => Err(e),
            };
        }
        let params = ListParams {
            resource_version: revision.map(str::to_owned),
            ..ListParams::default()
        };
        self.limiter.acquire().await;
        let nodes = self
            .api()
            .list(&params)
            .await
            .map_err(|e| translate_error(e, list.clone(), Operation::List))?;
        Ok(KVPairList {
            kvps: nodes
                .items
                .into_iter()
                .map(|node| node_to_kvp(node, self.use_pod_cidr))
                .collect::<Result<_, _>>()?,
            revision: nodes.metadata.resource_version,
        })
    }

    async fn watch(
        &self,
        list: &ListOptions,
        options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError> {
        let ListOptions::Resource(opts) = list else {
            return Err(DatastoreError::not_supported(list.clone(), Operation::Watch));
        };
        let mut params = WatchParams::default();
        if let Some(name) = &opts.name {
            params = params.fields(&format!("metadata.name={name}"));
        }
        let version = options.revision.as_deref().unwrap_or("0");
        self.limiter.acquire().await;
        let events = self
            .api()
            .watch(&params, version)
            .await
            .map_err(|e| translate_error(e, list.clone(), Operation::Watch))?;

        let use_pod_cidr = self.use_pod_cidr;
        let list = list.clone();
        Ok(events
            .filter_map(move |event| {
                futures::future::ready(convert_event(&list, use_pod_cidr, event))
            })
            .boxed())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::NodeSpec;
    use kube::api::ObjectMeta;
    use pretty_assertions::assert_eq;

    fn node(annotations: &[(&str, &str)], pod_cidrs: &[&str]) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_owned()),
                resource_version: Some("100".to_owned()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                        .collect(),
                ),
                ..ObjectMeta::default()
            },
            spec: Some(NodeSpec {
                pod_cidrs: Some(pod_cidrs.iter().map(ToString::to_string).collect()),
                ..NodeSpec::default()
            }),
            ..Node::default()
        }
    }

    #[test]
    fn test_node_to_kvp() {
        let node = node(
            &[
                (ANNOTATION_IPV4_ADDRESS, "10.0.0.5/24"),
                (ANNOTATION_AS_NUMBER, "64512"),
                ("unrelated", "x"),
            ],
            &["10.244.1.0/24"],
        );
        let kvp = node_to_kvp(node.clone(), false).unwrap();
        assert_eq!(kvp.key, Key::from(ResourceKey::new("Node", "worker-1")));
        assert_eq!(kvp.revision.as_deref(), Some("100"));
        assert_eq!(
            kvp.value["spec"],
            json!({ "bgp": { "ipv4Address": "10.0.0.5/24", "asNumber": 64512 } })
        );

        let kvp = node_to_kvp(node, true).unwrap();
        assert_eq!(kvp.value["spec"]["podCIDRs"], json!(["10.244.1.0/24"]));
    }

    #[test]
    fn test_convert_event() {
        let list: ListOptions = model::ResourceListOptions::kind(KIND_NODE).into();
        let event = ApiWatchEvent::Modified(node(&[(ANNOTATION_AS_NUMBER, "64512")], &[]));
        let Some(WatchEvent::Modified(kvp)) = convert_event(&list, false, Ok(event)) else {
            panic!("expected a modified event");
        };
        assert_eq!(kvp.key, Key::from(ResourceKey::new("Node", "worker-1")));
        assert_eq!(kvp.value["metadata"]["name"], json!("worker-1"));
        assert_eq!(kvp.value["metadata"]["resourceVersion"], json!("100"));

        let gone = kube::Error::Api(
            serde_json::from_value(json!({
                "status": "Failure",
                "message": "too old resource version",
                "reason": "Expired",
                "code": 410,
            }))
            .unwrap(),
        );
        assert!(matches!(
            convert_event(&list, false, Err(gone)),
            Some(WatchEvent::Error(_))
        ));
    }

    #[test]
    fn test_bgp_to_annotations() {
        let mut annotations = BTreeMap::from([
            (ANNOTATION_IPV4_ADDRESS.to_owned(), "10.0.0.5/24".to_owned()),
            (ANNOTATION_RR_CLUSTER_ID.to_owned(), "1.1.1.1".to_owned()),
            ("unrelated".to_owned(), "x".to_owned()),
        ]);
        let bgp = json!({ "ipv6Address": "fd00::5/64", "asNumber": 65000 });
        bgp_to_annotations(Some(&bgp), &mut annotations).unwrap();
        assert_eq!(
            annotations,
            BTreeMap::from([
                (ANNOTATION_IPV6_ADDRESS.to_owned(), "fd00::5/64".to_owned()),
                (ANNOTATION_AS_NUMBER.to_owned(), "65000".to_owned()),
                ("unrelated".to_owned(), "x".to_owned()),
            ])
        );

        // clearing the routing configuration removes every routing annotation
        bgp_to_annotations(None, &mut annotations).unwrap();
        assert_eq!(
            annotations,
            BTreeMap::from([("unrelated".to_owned(), "x".to_owned())])
        );

        assert!(bgp_to_annotations(Some(&json!("bad")), &mut annotations).is_err());
    }
}
