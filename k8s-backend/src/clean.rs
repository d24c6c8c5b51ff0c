// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Removal of everything that can be created through the datastore. Meant for test
//! environments.

use serde_json::Value;
use tracing::{debug, warn};

use model::kinds::{
    KIND_BGP_CONFIGURATION, KIND_BGP_FILTER, KIND_BGP_PEER, KIND_BLOCK_AFFINITY,
    KIND_CALICO_NODE_STATUS, KIND_CLUSTER_INFORMATION, KIND_FELIX_CONFIGURATION,
    KIND_GLOBAL_NETWORK_POLICY, KIND_GLOBAL_NETWORK_SET, KIND_HOST_ENDPOINT, KIND_IP_POOL,
    KIND_IP_RESERVATION, KIND_IPAM_CONFIG, KIND_KUBE_CONTROLLERS_CONFIGURATION,
    KIND_NETWORK_POLICY, KIND_NETWORK_SET, KIND_NODE, KIND_STAGED_GLOBAL_NETWORK_POLICY,
    KIND_STAGED_KUBERNETES_NETWORK_POLICY, KIND_STAGED_NETWORK_POLICY, KIND_TIER,
};
use model::{
    Backend, BlockAffinityListOptions, BlockListOptions, CleanReport, CleanStep, IpamConfigKey,
    IpamHandleListOptions, KVPair, Key, ListOptions, ResourceListOptions,
};

/// The kinds deleted by [`clean`], in order.
pub const CLEAN_KINDS: [&str; 20] = [
    KIND_BGP_CONFIGURATION,
    KIND_BGP_PEER,
    KIND_CLUSTER_INFORMATION,
    KIND_CALICO_NODE_STATUS,
    KIND_FELIX_CONFIGURATION,
    KIND_GLOBAL_NETWORK_POLICY,
    KIND_STAGED_GLOBAL_NETWORK_POLICY,
    KIND_NETWORK_POLICY,
    KIND_STAGED_NETWORK_POLICY,
    KIND_STAGED_KUBERNETES_NETWORK_POLICY,
    KIND_TIER,
    KIND_GLOBAL_NETWORK_SET,
    KIND_NETWORK_SET,
    KIND_IP_POOL,
    KIND_IP_RESERVATION,
    KIND_HOST_ENDPOINT,
    KIND_KUBE_CONTROLLERS_CONFIGURATION,
    KIND_IPAM_CONFIG,
    KIND_BLOCK_AFFINITY,
    KIND_BGP_FILTER,
];

/// Drop the routing configuration from a node value.
fn clear_bgp(kvp: &mut KVPair) {
    if let Some(spec) = kvp.value.get_mut("spec").and_then(Value::as_object_mut) {
        spec.remove("bgp");
    }
}

/// Delete everything `backend` can create. Failures are logged and recorded in the
/// report; none of them stops the cleanup.
pub async fn clean<B: Backend + ?Sized>(backend: &B) -> CleanReport {
    warn!("Cleaning the datastore of all creatable data");
    let mut report = CleanReport::default();

    for kind in CLEAN_KINDS {
        let list: ListOptions = ResourceListOptions::kind(kind).into();
        let kvps = match backend.list(&list, None).await {
            Ok(kvps) => kvps,
            Err(e) => {
                warn!("Failed to list {kind} resources: {e}");
                report.record(CleanStep::ListResources, kind, &e);
                continue;
            }
        };
        for kvp in kvps {
            if let Err(e) = backend.delete(&kvp.key, kvp.revision.as_deref()).await {
                warn!("Failed to delete {}: {e}", kvp.key);
                report.record(CleanStep::DeleteResource, &kvp.key, &e);
            }
        }
    }

    // IPAM entries are deleted with their revision
    let ipam_lists: [ListOptions; 3] = [
        BlockListOptions::default().into(),
        BlockAffinityListOptions::default().into(),
        IpamHandleListOptions.into(),
    ];
    for list in &ipam_lists {
        let kvps = match backend.list(list, None).await {
            Ok(kvps) => kvps,
            Err(e) => {
                warn!("Failed to list {list}: {e}");
                report.record(CleanStep::ListIpam, list, &e);
                continue;
            }
        };
        for kvp in kvps {
            if let Err(e) = backend.delete_kvp(&kvp).await {
                warn!("Failed to delete {}: {e}", kvp.key);
                report.record(CleanStep::DeleteIpam, &kvp.key, &e);
            }
        }
    }

    let nodes: ListOptions = ResourceListOptions::kind(KIND_NODE).into();
    match backend.list(&nodes, None).await {
        Ok(kvps) => {
            for mut kvp in kvps {
                clear_bgp(&mut kvp);
                if let Err(e) = backend.update(&kvp).await {
                    warn!("Failed to remove routing configuration from {}: {e}", kvp.key);
                    report.record(CleanStep::ResetNode, &kvp.key, &e);
                }
            }
        }
        Err(e) => {
            warn!("Failed to list nodes: {e}");
            report.record(CleanStep::ListNodes, &nodes, &e);
        }
    }

    let ipam_config: Key = IpamConfigKey.into();
    if let Err(e) = backend.delete(&ipam_config, None).await {
        warn!("Failed to delete the global IPAM configuration: {e}");
        report.record(CleanStep::DeleteIpamConfig, &ipam_config, &e);
    }

    debug!(
        "Datastore cleanup done, {} failures",
        report.failures.len()
    );
    report
}
