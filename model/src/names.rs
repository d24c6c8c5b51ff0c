// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Object names of the resources backing each key.

use ipnet::IpNet;

use crate::key::{BlockAffinityKey, Key};
use crate::kinds::IPAM_CONFIG_GLOBAL_NAME;

/// Object name of a CIDR: `10.0.0.0/26` becomes `10-0-0-0-26`, `fd00::/122` becomes
/// `fd00---122`.
#[must_use]
pub fn cidr_to_name(cidr: &IpNet) -> String {
    cidr.to_string().replace(['.', ':', '/'], "-")
}

/// Object name of a block affinity.
#[must_use]
pub fn block_affinity_name(key: &BlockAffinityKey) -> String {
    format!("{}-{}", key.host, cidr_to_name(&key.cidr))
}

/// Object name of an IPAM handle. Handle ids may contain upper case characters, object
/// names may not.
#[must_use]
pub fn ipam_handle_name(handle_id: &str) -> String {
    handle_id.to_lowercase()
}

/// The name of the object backing `key`, or `None` for keys that are not backed by an
/// object of their own.
#[must_use]
pub fn object_name(key: &Key) -> Option<String> {
    match key {
        Key::Resource(key) => Some(key.name.clone()),
        Key::Block(key) => Some(cidr_to_name(&key.cidr)),
        Key::BlockAffinity(key) => Some(block_affinity_name(key)),
        Key::IpamHandle(key) => Some(ipam_handle_name(&key.handle_id)),
        Key::IpamConfig(_) => Some(IPAM_CONFIG_GLOBAL_NAME.to_owned()),
        Key::HostConfig(_) | Key::ReadyFlag(_) => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::key::{BlockKey, IpamConfigKey, IpamHandleKey, ReadyFlagKey};

    #[test]
    fn test_cidr_names() {
        assert_eq!(cidr_to_name(&"10.0.0.0/26".parse().unwrap()), "10-0-0-0-26");
        assert_eq!(cidr_to_name(&"fd00::/122".parse().unwrap()), "fd00---122");
    }

    #[test]
    fn test_object_names() {
        let cidr: IpNet = "192.168.10.64/26".parse().unwrap();
        assert_eq!(
            object_name(&BlockKey { cidr }.into()).as_deref(),
            Some("192-168-10-64-26")
        );
        assert_eq!(
            object_name(&BlockAffinityKey::host(cidr, "worker-1").into()).as_deref(),
            Some("worker-1-192-168-10-64-26")
        );
        let handle = IpamHandleKey {
            handle_id: "k8s-pod-network.ABCDEF".to_owned(),
        };
        assert_eq!(
            object_name(&handle.into()).as_deref(),
            Some("k8s-pod-network.abcdef")
        );
        assert_eq!(
            object_name(&IpamConfigKey.into()).as_deref(),
            Some("default")
        );
        assert_eq!(object_name(&ReadyFlagKey.into()), None);
    }
}
