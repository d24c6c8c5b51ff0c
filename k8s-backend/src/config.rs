// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Connection settings of the Kubernetes datastore.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse datastore configuration: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// How to reach and use the Kubernetes API server.
///
/// Every field is optional. When nothing is set, the client falls back to the default
/// kubeconfig discovery and then to the in-cluster service account.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// A kubeconfig path, or a list of paths separated by the OS path-list separator.
    #[serde(rename = "kubeconfig", skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    /// A complete kubeconfig document. Takes precedence over `kubeconfig`.
    #[serde(rename = "kubeconfigInline", skip_serializing_if = "Option::is_none")]
    pub kubeconfig_inline: Option<String>,
    #[serde(rename = "k8sCurrentContext", skip_serializing_if = "Option::is_none")]
    pub k8s_current_context: Option<String>,
    #[serde(rename = "k8sAPIEndpoint", skip_serializing_if = "Option::is_none")]
    pub k8s_api_endpoint: Option<String>,
    #[serde(rename = "k8sCertFile", skip_serializing_if = "Option::is_none")]
    pub k8s_cert_file: Option<String>,
    #[serde(rename = "k8sKeyFile", skip_serializing_if = "Option::is_none")]
    pub k8s_key_file: Option<String>,
    #[serde(rename = "k8sCAFile", skip_serializing_if = "Option::is_none")]
    pub k8s_ca_file: Option<String>,
    #[serde(rename = "k8sAPIToken", skip_serializing_if = "Option::is_none")]
    pub k8s_api_token: Option<String>,
    #[serde(rename = "k8sInsecureSkipTLSVerify")]
    pub k8s_insecure_skip_tls_verify: bool,
    /// Client-side request rate limit. Unset or non-positive values select the default.
    #[serde(rename = "k8sClientQPS", skip_serializing_if = "Option::is_none")]
    pub k8s_client_qps: Option<f32>,
    /// Take IPAM from the nodes' pod CIDRs instead of the IPAM custom resources.
    #[serde(rename = "k8sUsePodCIDR")]
    pub k8s_use_pod_cidr: bool,
}

/// Datastore configuration file, as written for the command line tools.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    spec: DatastoreConfig,
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_owned(),
        }),
    }
}

impl DatastoreConfig {
    /// Parse a datastore configuration document. Both the bare settings and a document
    /// with the settings under `spec` are accepted.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(yaml)?;
        if value.get("spec").is_some() {
            let file: ConfigFile = serde_yaml_ng::from_value(value)?;
            Ok(file.spec)
        } else if value.is_null() {
            Ok(Self::default())
        } else {
            Ok(serde_yaml_ng::from_value(value)?)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading datastore configuration from {}", path.display());
        let yaml =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_yaml(&yaml)
    }

    /// Read the settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the settings through `lookup`, which maps environment variable names to values.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let mut config = Self {
            kubeconfig: get("KUBECONFIG"),
            kubeconfig_inline: get("KUBECONFIG_INLINE"),
            k8s_current_context: get("K8S_CURRENT_CONTEXT"),
            k8s_api_endpoint: get("K8S_API_ENDPOINT"),
            k8s_cert_file: get("K8S_CERT_FILE"),
            k8s_key_file: get("K8S_KEY_FILE"),
            k8s_ca_file: get("K8S_CA_FILE"),
            k8s_api_token: get("K8S_API_TOKEN"),
            ..Self::default()
        };
        if let Some(value) = get("K8S_INSECURE_SKIP_TLS_VERIFY") {
            config.k8s_insecure_skip_tls_verify =
                parse_bool("K8S_INSECURE_SKIP_TLS_VERIFY", &value)?;
        }
        if let Some(value) = get("USE_POD_CIDR") {
            config.k8s_use_pod_cidr = parse_bool("USE_POD_CIDR", &value)?;
        }
        if let Some(value) = get("K8S_CLIENT_QPS") {
            let qps = value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "K8S_CLIENT_QPS",
                value: value.clone(),
            })?;
            config.k8s_client_qps = Some(qps);
        }
        Ok(config)
    }
}
