// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resource kinds addressed through the generic resource key.

pub const KIND_BGP_CONFIGURATION: &str = "BGPConfiguration";
pub const KIND_BGP_FILTER: &str = "BGPFilter";
pub const KIND_BGP_PEER: &str = "BGPPeer";
pub const KIND_BLOCK_AFFINITY: &str = "BlockAffinity";
pub const KIND_CALICO_NODE_STATUS: &str = "CalicoNodeStatus";
pub const KIND_CLUSTER_INFORMATION: &str = "ClusterInformation";
pub const KIND_FELIX_CONFIGURATION: &str = "FelixConfiguration";
pub const KIND_GLOBAL_NETWORK_POLICY: &str = "GlobalNetworkPolicy";
pub const KIND_GLOBAL_NETWORK_SET: &str = "GlobalNetworkSet";
pub const KIND_HOST_ENDPOINT: &str = "HostEndpoint";
pub const KIND_IPAM_BLOCK: &str = "IPAMBlock";
pub const KIND_IPAM_CONFIG: &str = "IPAMConfig";
pub const KIND_IPAM_HANDLE: &str = "IPAMHandle";
pub const KIND_IP_POOL: &str = "IPPool";
pub const KIND_IP_RESERVATION: &str = "IPReservation";
pub const KIND_KUBE_CONTROLLERS_CONFIGURATION: &str = "KubeControllersConfiguration";
pub const KIND_KUBERNETES_ADMIN_NETWORK_POLICY: &str = "KubernetesAdminNetworkPolicy";
pub const KIND_KUBERNETES_BASELINE_ADMIN_NETWORK_POLICY: &str =
    "KubernetesBaselineAdminNetworkPolicy";
pub const KIND_KUBERNETES_ENDPOINT_SLICE: &str = "KubernetesEndpointSlice";
pub const KIND_KUBERNETES_NETWORK_POLICY: &str = "KubernetesNetworkPolicy";
pub const KIND_KUBERNETES_SERVICE: &str = "KubernetesService";
pub const KIND_NETWORK_POLICY: &str = "NetworkPolicy";
pub const KIND_NETWORK_SET: &str = "NetworkSet";
pub const KIND_NODE: &str = "Node";
pub const KIND_PROFILE: &str = "Profile";
pub const KIND_STAGED_GLOBAL_NETWORK_POLICY: &str = "StagedGlobalNetworkPolicy";
pub const KIND_STAGED_KUBERNETES_NETWORK_POLICY: &str = "StagedKubernetesNetworkPolicy";
pub const KIND_STAGED_NETWORK_POLICY: &str = "StagedNetworkPolicy";
pub const KIND_TIER: &str = "Tier";
pub const KIND_WORKLOAD_ENDPOINT: &str = "WorkloadEndpoint";

/// Name of the only host-config value this datastore can synthesize.
pub const HOST_CONFIG_TUNNEL_ADDR: &str = "IpInIpTunnelAddr";

/// Name of the global IPAM configuration object.
pub const IPAM_CONFIG_GLOBAL_NAME: &str = "default";
