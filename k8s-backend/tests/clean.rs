// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use kdd_k8s_backend::KubeClient;
use kdd_k8s_backend::clean::CLEAN_KINDS;
use kdd_k8s_backend::registry::Registry;
use kdd_k8s_backend::testing::MemoryClient;
use model::kinds::{
    KIND_BLOCK_AFFINITY, KIND_IP_POOL, KIND_IPAM_BLOCK, KIND_IPAM_CONFIG, KIND_IPAM_HANDLE,
    KIND_NETWORK_POLICY, KIND_NODE, KIND_TIER,
};
use model::{
    Backend, BlockAffinityKey, BlockKey, CleanStep, IpamConfigKey, IpamHandleKey, KVPair, KeyType,
    Key, ListType, Operation, ResourceKey, ResourceListOptions,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_test::traced_test;

/// A backend over in-memory clients, registered like the real ones.
struct Fixture {
    backend: KubeClient,
    clients: HashMap<&'static str, Arc<MemoryClient>>,
}

impl Fixture {
    fn new() -> Self {
        let mut clients: HashMap<&'static str, Arc<MemoryClient>> = HashMap::new();
        let mut builder = Registry::builder();
        for kind in CLEAN_KINDS.into_iter().chain([KIND_NODE]) {
            let client = Arc::new(MemoryClient::new(kind));
            builder.register(KeyType::Resource, None, kind, client.clone());
            clients.insert(kind, client);
        }
        let blocks = Arc::new(MemoryClient::new(KIND_IPAM_BLOCK));
        let handles = Arc::new(MemoryClient::new(KIND_IPAM_HANDLE));
        builder
            .register(
                KeyType::BlockAffinity,
                Some(ListType::BlockAffinity),
                KIND_BLOCK_AFFINITY,
                clients[KIND_BLOCK_AFFINITY].clone(),
            )
            .register(KeyType::Block, Some(ListType::Block), KIND_IPAM_BLOCK, blocks.clone())
            .register(
                KeyType::IpamHandle,
                Some(ListType::IpamHandle),
                KIND_IPAM_HANDLE,
                handles.clone(),
            )
            .register(
                KeyType::IpamConfig,
                None,
                KIND_IPAM_CONFIG,
                clients[KIND_IPAM_CONFIG].clone(),
            );
        clients.insert(KIND_IPAM_BLOCK, blocks);
        clients.insert(KIND_IPAM_HANDLE, handles);
        Self {
            backend: KubeClient::with_registry(builder.build()),
            clients,
        }
    }

    fn client(&self, kind: &str) -> &MemoryClient {
        &self.clients[kind]
    }

    fn populate(&self) {
        let cidr = "10.0.0.0/26".parse().unwrap();
        self.client(KIND_TIER)
            .insert(KVPair::new(ResourceKey::new(KIND_TIER, "default"), json!({})));
        self.client(KIND_IP_POOL)
            .insert(KVPair::new(ResourceKey::new(KIND_IP_POOL, "pool-1"), json!({})));
        self.client(KIND_IP_POOL)
            .insert(KVPair::new(ResourceKey::new(KIND_IP_POOL, "pool-2"), json!({})));
        self.client(KIND_NETWORK_POLICY).insert(KVPair::new(
            ResourceKey::namespaced(KIND_NETWORK_POLICY, "prod", "deny-all"),
            json!({}),
        ));
        self.client(KIND_IPAM_BLOCK)
            .insert(KVPair::new(BlockKey { cidr }, json!({})));
        self.client(KIND_BLOCK_AFFINITY).insert(KVPair::new(
            BlockAffinityKey::host(cidr, "node-1"),
            json!({}),
        ));
        self.client(KIND_IPAM_HANDLE).insert(KVPair::new(
            IpamHandleKey {
                handle_id: "k8s-pod-network.abc".to_owned(),
            },
            json!({}),
        ));
        self.client(KIND_IPAM_CONFIG)
            .insert(KVPair::new(IpamConfigKey, json!({ "strictAffinity": true })));
        for name in ["node-1", "node-2"] {
            self.client(KIND_NODE).insert(KVPair::new(
                ResourceKey::new(KIND_NODE, name),
                json!({ "spec": { "bgp": { "asNumber": 64512 } } }),
            ));
        }
    }
}

#[tokio::test]
#[traced_test]
async fn clean_removes_everything() {
    let fixture = Fixture::new();
    fixture.populate();

    let report = fixture.backend.clean().await.unwrap();
    assert!(report.is_clean(), "{report:?}");

    for (kind, client) in &fixture.clients {
        if *kind != KIND_NODE {
            assert!(client.entries().is_empty(), "{kind} not cleaned");
        }
    }
    let nodes = fixture.client(KIND_NODE).entries();
    assert_eq!(nodes.len(), 2);
    for node in nodes {
        assert_eq!(node.value, json!({ "spec": {} }));
    }
    assert!(logs_contain("Cleaning the datastore"));
}

#[tokio::test]
async fn clean_deletes_ipam_entries_with_their_revision() {
    let fixture = Fixture::new();
    fixture.populate();
    fixture.backend.clean().await.unwrap();

    let deletes: Vec<_> = fixture
        .client(KIND_IPAM_BLOCK)
        .calls()
        .into_iter()
        .filter(|call| call.operation == Operation::Delete)
        .collect();
    assert_eq!(deletes.len(), 1);
    assert!(deletes[0].revision.is_some());
}

#[tokio::test]
#[traced_test]
async fn clean_continues_after_failures() {
    let fixture = Fixture::new();
    fixture.populate();
    let tiers = ResourceListOptions::kind(KIND_TIER);
    let pool = ResourceKey::new(KIND_IP_POOL, "pool-1");
    let node = ResourceKey::new(KIND_NODE, "node-1");
    fixture
        .client(KIND_TIER)
        .fail(Operation::List, model::ListOptions::from(tiers));
    fixture
        .client(KIND_IP_POOL)
        .fail(Operation::Delete, Key::from(pool.clone()));
    fixture
        .client(KIND_NODE)
        .fail(Operation::Update, Key::from(node.clone()));

    let report = fixture.backend.clean().await.unwrap();

    let failed: Vec<(CleanStep, &str)> = report
        .failures
        .iter()
        .map(|f| (f.step, f.target.as_str()))
        .collect();
    assert_eq!(
        failed,
        vec![
            (CleanStep::ListResources, "Tier"),
            (CleanStep::DeleteResource, "IPPool(pool-1)"),
            (CleanStep::ResetNode, "Node(node-1)"),
        ]
    );

    // everything else went ahead
    assert_eq!(fixture.client(KIND_TIER).entries().len(), 1);
    let pools = fixture.client(KIND_IP_POOL).entries();
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].key, Key::from(pool));
    assert!(fixture.client(KIND_IPAM_BLOCK).entries().is_empty());
    assert!(fixture.client(KIND_IPAM_CONFIG).entries().is_empty());
    let node_2 = fixture
        .client(KIND_NODE)
        .stored(&ResourceKey::new(KIND_NODE, "node-2").into())
        .unwrap();
    assert_eq!(node_2.value, json!({ "spec": {} }));
    let node_1 = fixture.client(KIND_NODE).stored(&node.into()).unwrap();
    assert_eq!(
        node_1.value,
        json!({ "spec": { "bgp": { "asNumber": 64512 } } })
    );
    assert!(logs_contain("Failed to list Tier resources"));
}

#[tokio::test]
async fn clean_reports_missing_ipam_config() {
    let fixture = Fixture::new();
    let report = fixture.backend.clean().await.unwrap();
    let failures: Vec<_> = report.failures_in(CleanStep::DeleteIpamConfig).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target, "IPAMConfig(global)");
    assert_eq!(report.failures.len(), 1);
}
