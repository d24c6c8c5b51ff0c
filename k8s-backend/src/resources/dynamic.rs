// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resource client for kinds stored as plain API objects, served through `DynamicObject`.

use async_trait::async_trait;
use futures::StreamExt;
use ipnet::IpNet;
use kube::Client;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, ObjectMeta, PostParams,
    Preconditions, WatchEvent as ApiWatchEvent, WatchParams,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use model::key::AFFINITY_TYPE_HOST;
use model::names::object_name;
use model::{
    BlockAffinityKey, BlockKey, DatastoreError, IpamHandleKey, KVPair, KVPairList, Key,
    ListOptions, Operation, ResourceKey, WatchEvent, WatchOptions, WatchStream,
};

use super::{ResourceClient, translate_error};
use crate::ratelimit::RateLimiter;

/// Converts between key/value pairs and the API objects of one resource.
#[derive(Clone, Debug)]
pub(crate) struct ObjectCodec {
    kind: String,
    resource: ApiResource,
    namespaced: bool,
}

fn ip_version(cidr: &IpNet) -> u8 {
    match cidr {
        IpNet::V4(_) => 4,
        IpNet::V6(_) => 6,
    }
}

fn spec_str<'a>(obj: &'a DynamicObject, field: &str) -> Option<&'a str> {
    obj.data
        .get("spec")
        .and_then(|spec| spec.get(field))
        .and_then(Value::as_str)
}

fn spec_cidr(obj: &DynamicObject) -> Result<IpNet, String> {
    let cidr = spec_str(obj, "cidr").ok_or("spec.cidr is missing")?;
    cidr.parse()
        .map_err(|e| format!("invalid spec.cidr '{cidr}': {e}"))
}

impl ObjectCodec {
    pub(crate) fn new(kind: &str, resource: ApiResource, namespaced: bool) -> Self {
        Self {
            kind: kind.to_owned(),
            resource,
            namespaced,
        }
    }

    pub(crate) fn name(&self, key: &Key) -> Result<String, DatastoreError> {
        object_name(key).ok_or_else(|| {
            DatastoreError::invalid_value(
                key.clone(),
                format!("key does not address a {} object", self.kind),
            )
        })
    }

    /// Build the object to send to the API server. Only the labels and annotations of
    /// the value's metadata are carried over; the name and namespace come from the key.
    pub(crate) fn encode(&self, kvp: &KVPair) -> Result<DynamicObject, DatastoreError> {
        let name = self.name(&kvp.key)?;
        let Value::Object(mut body) = kvp.value.clone() else {
            return Err(DatastoreError::invalid_value(
                kvp.key.clone(),
                "value is not a JSON object",
            ));
        };
        body.remove("apiVersion");
        body.remove("kind");

        let mut obj = DynamicObject::new(&name, &self.resource);
        if let Some(metadata) = body.remove("metadata") {
            let metadata: ObjectMeta = serde_json::from_value(metadata).map_err(|e| {
                DatastoreError::invalid_value(kvp.key.clone(), format!("invalid metadata: {e}"))
            })?;
            obj.metadata.labels = metadata.labels;
            obj.metadata.annotations = metadata.annotations;
        }
        if self.namespaced {
            obj.metadata.namespace = kvp.key.namespace().map(str::to_owned);
        }
        obj.metadata.resource_version.clone_from(&kvp.revision);
        obj.metadata.uid.clone_from(&kvp.uid);
        obj.data = Value::Object(body);
        Ok(obj)
    }

    /// Turn an object read from the API server into a key/value pair.
    pub(crate) fn decode(&self, key: Key, obj: DynamicObject) -> Result<KVPair, DatastoreError> {
        let metadata = serde_json::to_value(&obj.metadata).map_err(|e| {
            DatastoreError::invalid_value(key.clone(), format!("invalid metadata: {e}"))
        })?;
        let mut body = match obj.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("metadata".to_owned(), metadata);
        Ok(KVPair {
            key,
            value: Value::Object(body),
            revision: obj.metadata.resource_version,
            uid: obj.metadata.uid,
        })
    }

    /// Rebuild the key of an object returned for `list`. The shape of the key follows
    /// the shape of the query.
    pub(crate) fn key_for(&self, list: &ListOptions, obj: &DynamicObject) -> Result<Key, String> {
        let name = obj.metadata.name.clone().ok_or("object has no name")?;
        match list {
            ListOptions::Resource(_) => Ok(ResourceKey {
                kind: self.kind.clone(),
                namespace: if self.namespaced {
                    obj.metadata.namespace.clone()
                } else {
                    None
                },
                name,
            }
            .into()),
            ListOptions::Block(_) => Ok(BlockKey {
                cidr: spec_cidr(obj)?,
            }
            .into()),
            ListOptions::BlockAffinity(_) => {
                let host = spec_str(obj, "node").ok_or("spec.node is missing")?;
                Ok(BlockAffinityKey {
                    cidr: spec_cidr(obj)?,
                    host: host.to_owned(),
                    affinity_type: spec_str(obj, "type")
                        .unwrap_or(AFFINITY_TYPE_HOST)
                        .to_owned(),
                }
                .into())
            }
            ListOptions::IpamHandle(_) => {
                let handle_id = spec_str(obj, "handleID").ok_or("spec.handleID is missing")?;
                Ok(IpamHandleKey {
                    handle_id: handle_id.to_owned(),
                }
                .into())
            }
            ListOptions::HostConfig(_) => Err(format!("{} objects are not host config", self.kind)),
        }
    }
}

/// Whether `key` is selected by the filters of `list` that the API server does not apply.
pub(crate) fn selected(list: &ListOptions, key: &Key) -> bool {
    match (list, key) {
        (ListOptions::Resource(opts), Key::Resource(key)) => {
            opts.name.as_ref().is_none_or(|name| *name == key.name)
        }
        (ListOptions::Block(opts), Key::Block(key)) => opts
            .ip_version
            .is_none_or(|version| version == ip_version(&key.cidr)),
        (ListOptions::BlockAffinity(opts), Key::BlockAffinity(key)) => {
            opts.host.as_ref().is_none_or(|host| *host == key.host)
                && opts
                    .ip_version
                    .is_none_or(|version| version == ip_version(&key.cidr))
                && opts
                    .affinity_type
                    .as_ref()
                    .is_none_or(|t| *t == key.affinity_type)
        }
        _ => true,
    }
}

fn convert_event(
    codec: &ObjectCodec,
    list: &ListOptions,
    event: Result<ApiWatchEvent<DynamicObject>, kube::Error>,
) -> Option<WatchEvent> {
    let (obj, wrap): (DynamicObject, fn(KVPair) -> WatchEvent) = match event {
        Ok(ApiWatchEvent::Added(obj)) => (obj, WatchEvent::Added),
        Ok(ApiWatchEvent::Modified(obj)) => (obj, WatchEvent::Modified),
        Ok(ApiWatchEvent::Deleted(obj)) => (obj, WatchEvent::Deleted),
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
    let key = match codec.key_for(list, &obj) {
        Ok(key) => key,
        Err(reason) => {
            warn!("Skipping watch event for {}: {reason}", codec.kind);
            return None;
        }
    };
    if !selected(list, &key) {
        return None;
    }
    match codec.decode(key, obj) {
        Ok(kvp) => Some(wrap(kvp)),
        Err(e) => Some(WatchEvent::Error(e)),
    }
}

/// Serves one kind backed by a custom, admin-policy or built-in API resource.
pub struct DynamicResourceClient {
    codec: ObjectCodec,
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl DynamicResourceClient {
    #[must_use]
    pub fn new(
        kind: &str,
        resource: ApiResource,
        namespaced: bool,
        client: Client,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            codec: ObjectCodec::new(kind, resource, namespaced),
            client,
            limiter,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.codec.kind
    }

    #[must_use]
    pub fn api_resource(&self) -> &ApiResource {
        &self.codec.resource
    }

    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        self.codec.namespaced
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if self.codec.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &self.codec.resource)
            }
            _ => Api::all_with(self.client.clone(), &self.codec.resource),
        }
    }

    /// The API for a single object. Namespaced kinds need the namespace in the key.
    fn api_for_key(&self, key: &Key) -> Result<Api<DynamicObject>, DatastoreError> {
        if self.codec.namespaced && key.namespace().is_none() {
            return Err(DatastoreError::invalid_value(
                key.clone(),
                format!("{} is namespaced, the key has no namespace", self.codec.kind),
            ));
        }
        Ok(self.api(key.namespace()))
    }
}

#[async_trait]
impl ResourceClient for DynamicResourceClient {
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        let api = self.api_for_key(&kvp.key)?;
        let mut obj = self.codec.encode(kvp)?;
        obj.metadata.resource_version = None;
        obj.metadata.uid = None;
        self.limiter.acquire().await;
        let created = api
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| translate_error(e, kvp.key.clone(), Operation::Create))?;
        self.codec.decode(kvp.key.clone(), created)
    }

    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        let api = self.api_for_key(&kvp.key)?;
        let name = self.codec.name(&kvp.key)?;
        let obj = self.codec.encode(kvp)?;
        self.limiter.acquire().await;
        let updated = api
            .replace(&name, &PostParams::default(), &obj)
            .await
            .map_err(|e| translate_error(e, kvp.key.clone(), Operation::Update))?;
        self.codec.decode(kvp.key.clone(), updated)
    }

    async fn delete(
        &self,
        key: &Key,
        revision: Option<&str>,
        uid: Option<&str>,
    ) -> Result<KVPair, DatastoreError> {
        let api = self.api_for_key(key)?;
        let name = self.codec.name(key)?;
        let preconditions = (revision.is_some() || uid.is_some()).then(|| Preconditions {
            resource_version: revision.map(str::to_owned),
            uid: uid.map(str::to_owned),
        });
        let params = DeleteParams {
            preconditions,
            ..DeleteParams::default()
        };
        self.limiter.acquire().await;
        let deleted = api
            .delete(&name, &params)
            .await
            .map_err(|e| translate_error(e, key.clone(), Operation::Delete))?;
        match deleted.left() {
            Some(obj) => self.codec.decode(key.clone(), obj),
            None => Ok(KVPair::new(key.clone(), Value::Null)),
        }
    }

    async fn get(&self, key: &Key, revision: Option<&str>) -> Result<KVPair, DatastoreError> {
        let api = self.api_for_key(key)?;
        let name = self.codec.name(key)?;
        if let Some(revision) = revision {
            debug!("Reading latest {key}, requested revision {revision} ignored");
        }
        self.limiter.acquire().await;
        let obj = api
            .get(&name)
            .await
            .map_err(|e| translate_error(e, key.clone(), Operation::Get))?;
        self.codec.decode(key.clone(), obj)
    }

    async fn list(
        &self,
        list: &ListOptions,
        revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError> {
        if let ListOptions::HostConfig(_) = list {
            return Err(DatastoreError::not_supported(list.clone(), Operation::List));
        }
        // a list for one named object is a get
        if let ListOptions::Resource(opts) = list
            && let Some(name) = &opts.name
        {
            let key: Key = ResourceKey {
                kind: self.codec.kind.clone(),
                namespace: opts.namespace.clone(),
                name: name.clone(),
            }
            .into();
            return match self.get(&key, revision).await {
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
        let objects = self
            .api(list.namespace())
            .list(&params)
            .await
            .map_err(|e| translate_error(e, list.clone(), Operation::List))?;

        let mut kvps = Vec::with_capacity(objects.items.len());
        for obj in objects.items {
            let key = match self.codec.key_for(list, &obj) {
                Ok(key) => key,
                Err(reason) => {
                    warn!("Skipping {} object: {reason}", self.codec.kind);
                    continue;
                }
            };
            if selected(list, &key) {
                kvps.push(self.codec.decode(key, obj)?);
            }
        }
        Ok(KVPairList {
            kvps,
            revision: objects.metadata.resource_version,
        })
    }

    async fn watch(
        &self,
        list: &ListOptions,
        options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError> {
        if let ListOptions::HostConfig(_) = list {
            return Err(DatastoreError::not_supported(list.clone(), Operation::Watch));
        }
        let version = options.revision.as_deref().unwrap_or("0");
        self.limiter.acquire().await;
        let events = self
            .api(list.namespace())
            .watch(&WatchParams::default(), version)
            .await
            .map_err(|e| translate_error(e, list.clone(), Operation::Watch))?;

        let codec = self.codec.clone();
        let list = list.clone();
        Ok(events
            .filter_map(move |event| futures::future::ready(convert_event(&codec, &list, event)))
            .boxed())
    }
}
