// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-kind resource clients.

mod catalog;
mod dynamic;
mod node;

pub use catalog::{Backing, CATALOG, KindEntry, register_resource_clients};
pub use dynamic::DynamicResourceClient;
pub use node::{
    ANNOTATION_AS_NUMBER, ANNOTATION_IPV4_ADDRESS, ANNOTATION_IPV6_ADDRESS,
    ANNOTATION_RR_CLUSTER_ID, NodeClient,
};

use async_trait::async_trait;
use model::{
    DatastoreError, Identifier, KVPair, KVPairList, Key, ListOptions, Operation, WatchOptions,
    WatchStream,
};
use std::sync::Arc;

/// Storage operations for the resources of one kind, or one family of narrow keys.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn create(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError>;

    async fn update(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError>;

    /// Delete by key. `uid`, when set, must match the stored object as well.
    async fn delete(
        &self,
        key: &Key,
        revision: Option<&str>,
        uid: Option<&str>,
    ) -> Result<KVPair, DatastoreError>;

    async fn delete_kvp(&self, kvp: &KVPair) -> Result<KVPair, DatastoreError> {
        self.delete(&kvp.key, kvp.revision.as_deref(), kvp.uid.as_deref())
            .await
    }

    async fn get(&self, key: &Key, revision: Option<&str>) -> Result<KVPair, DatastoreError>;

    async fn list(
        &self,
        list: &ListOptions,
        revision: Option<&str>,
    ) -> Result<KVPairList, DatastoreError>;

    async fn watch(
        &self,
        list: &ListOptions,
        options: &WatchOptions,
    ) -> Result<WatchStream, DatastoreError>;
}

pub type SharedResourceClient = Arc<dyn ResourceClient>;

/// Map an API server error onto the datastore error model.
pub fn translate_error(
    err: kube::Error,
    identifier: impl Into<Identifier>,
    operation: Operation,
) -> DatastoreError {
    let identifier = identifier.into();
    match err {
        kube::Error::Api(ref status) if status.code == 404 => {
            DatastoreError::ResourceDoesNotExist { identifier }
        }
        kube::Error::Api(ref status) if status.code == 409 => {
            if operation == Operation::Create {
                DatastoreError::ResourceAlreadyExists { identifier }
            } else {
                DatastoreError::ResourceUpdateConflict { identifier }
            }
        }
        kube::Error::Api(ref status) if status.code == 401 || status.code == 403 => {
            DatastoreError::Unauthorized { identifier }
        }
        other => DatastoreError::Client {
            identifier,
            source: Box::new(other),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use model::kinds::KIND_IP_POOL;
    use model::{ResourceKey, ResourceListOptions};
    use serde_json::json;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(
            serde_json::from_value(json!({
                "status": "Failure",
                "message": "rejected",
                "reason": "Test",
                "code": code,
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_translate_error() {
        let key: Key = ResourceKey::new(KIND_IP_POOL, "default").into();
        let id = || key.clone();

        assert!(matches!(
            translate_error(api_error(404), id(), Operation::Get),
            DatastoreError::ResourceDoesNotExist { .. }
        ));
        assert!(matches!(
            translate_error(api_error(409), id(), Operation::Create),
            DatastoreError::ResourceAlreadyExists { .. }
        ));
        assert!(matches!(
            translate_error(api_error(409), id(), Operation::Update),
            DatastoreError::ResourceUpdateConflict { .. }
        ));
        assert!(matches!(
            translate_error(api_error(409), id(), Operation::Delete),
            DatastoreError::ResourceUpdateConflict { .. }
        ));
        for code in [401, 403] {
            assert!(matches!(
                translate_error(api_error(code), id(), Operation::Get),
                DatastoreError::Unauthorized { .. }
            ));
        }
        let err = translate_error(api_error(500), id(), Operation::Update);
        assert!(matches!(err, DatastoreError::Client { .. }));
        assert_eq!(err.identifier(), &Identifier::Key(key.clone()));
    }

    #[test]
    fn test_translate_list_error() {
        let list: ListOptions = ResourceListOptions::kind(KIND_IP_POOL).into();
        let err = translate_error(api_error(403), list.clone(), Operation::List);
        assert!(matches!(err, DatastoreError::Unauthorized { .. }));
        assert_eq!(err.identifier(), &Identifier::List(list));
    }
}
