// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The Kubernetes datastore backend: routes every request to the resource client
//! registered for its key or list query.

use async_trait::async_trait;
use tracing::{debug, info};

use model::{
    Backend, CleanReport, DatastoreError, KVPair, KVPairList, Key, ListOptions, Operation,
    WatchOptions, WatchStream,
};

use crate::clean;
use crate::config::DatastoreConfig;
use crate::factory::{ClientFactoryError, ClientSet};
use crate::registry::Registry;
use crate::resources::{SharedResourceClient, register_resource_clients};

pub struct KubeClient {
    clients: Option<ClientSet>,
    registry: Registry,
}

impl KubeClient {
    /// Connect to the API server described by `config` and register a resource client
    /// for every supported kind.
    pub async fn new(config: &DatastoreConfig) -> Result<Self, ClientFactoryError> {
        let clients = ClientSet::new(config).await?;
        let mut builder = Registry::builder();
        register_resource_clients(&mut builder, &clients, config.k8s_use_pod_cidr);
        info!("Kubernetes datastore backend ready");
        Ok(Self {
            clients: Some(clients),
            registry: builder.build(),
        })
    }

    /// A backend serving from a prebuilt registry, with no API server connection.
    #[must_use]
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            clients: None,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The API server clients, if this backend is connected to one.
    #[must_use]
    pub fn clients(&self) -> Option<&ClientSet> {
        self.clients.as_ref()
    }

    fn client_for_key(
        &self,
        key: &Key,
        operation: Operation,
    ) -> Result<&SharedResourceClient, DatastoreError> {
        self.registry.for_key(key).ok_or_else(|| {
            debug!("{operation} is not supported on {key}");
            DatastoreError::not_supported(key.clone(), operation)
        })
    }

    fn client_for_list(
        &self,
        list: &ListOptions,
        operation: Operation,
    ) -> Result<&SharedResourceClient, DatastoreError> {
        self.registry.for_list(list).ok_or_else(|| {
            if operation == Operation::List {
                info!("{operation} is not supported on {list}");
            } else {
                debug!("{operation} is not supported on {list}");
            }
            DatastoreError::not_supported(list.clone(), operation)
        })
    }
}

#[async_trait]
impl Backend for KubeClient {
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        debug!("Performing 'Create' for {}", kvp.key);
        self.client_for_key(&kvp.key, Operation::Create)?
            .create(kvp)
            .await
    }

    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        debug!("Performing 'Update' for {}", kvp.key);
        self.client_for_key(&kvp.key, Operation::Update)?
            .update(kvp)
            .await
    }

    /// Create the entry, or update it if it exists. The two steps are not atomic.
    async fn apply(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        debug!("Performing 'Apply' for {}", kvp.key);
        match self.create(&kvp.without_revision()).await {
            Err(e) if e.is_already_exists() => {
                debug!("{} already exists, updating it", kvp.key);
                self.update(kvp).await
            }
            result => result,
        }
    }

    async fn delete(&self, key: &Key, revision: Option<&str>) -> Result<KVPair, DatastoreError> {
        debug!("Performing 'Delete' for {key}");
        self.client_for_key(key, Operation::Delete)?
            .delete(key, revision, None)
            .await
    }

    async fn delete_kvp(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        debug!("Performing 'DeleteKVP' for {}", kvp.key);
        self.client_for_key(&kvp.key, Operation::Delete)?
            .delete_kvp(kvp)
            .await
    }

    async fn get(&self, key: &Key, revision: Option<&str>) -> Result<KVPair, DatastoreError> {
        debug!("Performing 'Get' for {key}");
        self.client_for_key(key, Operation::Get)?
            .get(key, revision)
            .await
    }

    async fn list(
        &self,
        list: &ListOptions,
        revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError> {
        debug!("Performing 'List' for {list}");
        self.client_for_list(list, Operation::List)?
            .list(list, revision)
            .await
    }

    async fn watch(
        &self,
        list: &ListOptions,
        options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError> {
        debug!("Performing 'Watch' for {list}");
        self.client_for_list(list, Operation::Watch)?
            .watch(list, options)
            .await
    }

    async fn ensure_initialized(&self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn clean(&self) -> Result<CleanReport, DatastoreError> {
        Ok(clean::clean(self).await)
    }

    async fn close(&self) -> Result<(), DatastoreError> {
        debug!("Closed client - NOOP");
        Ok(())
    }
}
