// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Construction of the API server clients from a [`DatastoreConfig`].

use kube::api::ApiResource;
use kube::config::{
    AuthInfo, Cluster, Context, KubeConfigOptions, Kubeconfig, KubeconfigError, NamedAuthInfo,
    NamedCluster, NamedContext,
};
use kube::core::GroupVersionKind;
use kube::{Client, Config};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DatastoreConfig;
use crate::ratelimit::RateLimiter;

/// Client-side rate limit used unless configured otherwise.
pub const DEFAULT_QPS: f32 = 5.0;
pub const DEFAULT_BURST: u32 = 100;

/// API group and version of the custom resources.
pub const CRD_GROUP: &str = "crd.projectcalico.org";
pub const CRD_VERSION: &str = "v1";

/// API group and version of the cluster-scoped admin network policies.
pub const ADMIN_POLICY_GROUP: &str = "policy.networking.k8s.io";
pub const ADMIN_POLICY_VERSION: &str = "v1alpha1";

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const IN_CLUSTER: &str = "in-cluster";
/// Name of the context, cluster and user created for overrides that have no context to
/// land in.
const OVERRIDES: &str = "overrides";

#[derive(Debug, Error)]
pub enum ClientFactoryError {
    #[error("Failed to parse inline kubeconfig: {0}")]
    InlineKubeconfig(#[source] KubeconfigError),
    #[error("Failed to load kubeconfig {}: {source}", path.display())]
    ReadKubeconfig {
        path: PathBuf,
        #[source]
        source: KubeconfigError,
    },
    #[error("Failed to merge kubeconfig {}: {source}", path.display())]
    MergeKubeconfig {
        path: PathBuf,
        #[source]
        source: KubeconfigError,
    },
    #[error("Failed to build in-cluster kubeconfig: {0}")]
    InCluster(#[from] serde_json::Error),
    #[error("No kubeconfig found and not running inside a cluster")]
    NoConfiguration,
    #[error("Failed to build client configuration: {0}")]
    ClientConfig(#[source] KubeconfigError),
    #[error("Failed to build {which} client: {source}")]
    BuildClient {
        which: &'static str,
        #[source]
        source: kube::Error,
    },
}

/// Where to look for kubeconfig files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadingRules {
    /// A single file that must exist.
    pub explicit_path: Option<PathBuf>,
    /// Files merged in order, the first file setting a value wins. Missing files are
    /// skipped.
    pub precedence: Vec<PathBuf>,
    /// Warn when none of the `precedence` files exist.
    pub warn_if_all_missing: bool,
}

/// Drop repeated entries, keeping the first occurrence of each.
fn deduplicate(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

impl LoadingRules {
    /// Interpret a kubeconfig setting: several paths joined by the OS path-list separator
    /// form a precedence list, anything else is an explicit path.
    #[must_use]
    pub fn from_kubeconfig_spec(spec: &str) -> Self {
        let files: Vec<PathBuf> = std::env::split_paths(spec).collect();
        if files.len() > 1 {
            Self {
                precedence: deduplicate(files),
                warn_if_all_missing: true,
                ..Self::default()
            }
        } else {
            Self {
                explicit_path: Some(PathBuf::from(spec)),
                ..Self::default()
            }
        }
    }

    /// Load and merge the files named by the rules. Returns `None` when no file was found.
    pub fn load(&self) -> Result<Option<Kubeconfig>, ClientFactoryError> {
        if let Some(path) = &self.explicit_path {
            let kubeconfig =
                Kubeconfig::read_from(path).map_err(|source| ClientFactoryError::ReadKubeconfig {
                    path: path.clone(),
                    source,
                })?;
            return Ok(Some(kubeconfig));
        }

        let mut merged: Option<Kubeconfig> = None;
        for path in &self.precedence {
            if !path.exists() {
                debug!("Skipping missing kubeconfig {}", path.display());
                continue;
            }
            let next =
                Kubeconfig::read_from(path).map_err(|source| ClientFactoryError::ReadKubeconfig {
                    path: path.clone(),
                    source,
                })?;
            merged = Some(match merged {
                None => next,
                Some(current) => current.merge(next).map_err(|source| {
                    ClientFactoryError::MergeKubeconfig {
                        path: path.clone(),
                        source,
                    }
                })?,
            });
        }
        if merged.is_none() && self.warn_if_all_missing && !self.precedence.is_empty() {
            warn!(
                "None of the kubeconfig files {:?} exist",
                self.precedence
            );
        }
        Ok(merged)
    }
}

/// Connection settings layered on top of the loaded kubeconfig.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub server: Option<String>,
    pub client_certificate: Option<String>,
    pub client_key: Option<String>,
    pub certificate_authority: Option<String>,
    pub token: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub current_context: Option<String>,
}

impl From<&DatastoreConfig> for ConfigOverrides {
    fn from(config: &DatastoreConfig) -> Self {
        let set = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        Self {
            server: set(&config.k8s_api_endpoint),
            client_certificate: set(&config.k8s_cert_file),
            client_key: set(&config.k8s_key_file),
            certificate_authority: set(&config.k8s_ca_file),
            token: set(&config.k8s_api_token),
            insecure_skip_tls_verify: config.k8s_insecure_skip_tls_verify,
            current_context: set(&config.k8s_current_context),
        }
    }
}

fn cluster_entry<'a>(kubeconfig: &'a mut Kubeconfig, name: &str) -> &'a mut Cluster {
    let index = match kubeconfig.clusters.iter().position(|c| c.name == name) {
        Some(index) => index,
        None => {
            kubeconfig.clusters.push(NamedCluster {
                name: name.to_owned(),
                cluster: None,
            });
            kubeconfig.clusters.len() - 1
        }
    };
    kubeconfig.clusters[index]
        .cluster
        .get_or_insert_with(Cluster::default)
}

fn context_entry<'a>(kubeconfig: &'a mut Kubeconfig, name: &str) -> &'a mut Context {
    let index = match kubeconfig.contexts.iter().position(|c| c.name == name) {
        Some(index) => index,
        None => {
            debug!("Creating kubeconfig context '{name}' for the connection overrides");
            kubeconfig.contexts.push(NamedContext {
                name: name.to_owned(),
                context: None,
            });
            kubeconfig.contexts.len() - 1
        }
    };
    kubeconfig.contexts[index]
        .context
        .get_or_insert_with(|| Context {
            cluster: name.to_owned(),
            user: Some(name.to_owned()),
            ..Context::default()
        })
}

fn auth_info_entry<'a>(kubeconfig: &'a mut Kubeconfig, name: &str) -> &'a mut AuthInfo {
    let index = match kubeconfig.auth_infos.iter().position(|a| a.name == name) {
        Some(index) => index,
        None => {
            kubeconfig.auth_infos.push(NamedAuthInfo {
                name: name.to_owned(),
                auth_info: None,
            });
            kubeconfig.auth_infos.len() - 1
        }
    };
    kubeconfig.auth_infos[index]
        .auth_info
        .get_or_insert_with(AuthInfo::default)
}

impl ConfigOverrides {
    fn has_cluster_overrides(&self) -> bool {
        self.server.is_some()
            || self.certificate_authority.is_some()
            || self.insecure_skip_tls_verify
    }

    fn has_auth_overrides(&self) -> bool {
        self.client_certificate.is_some() || self.client_key.is_some() || self.token.is_some()
    }

    /// Apply the overrides to the cluster and user of the selected context. The context and
    /// its entries are created when the kubeconfig lacks them.
    pub fn apply(&self, kubeconfig: &mut Kubeconfig) -> KubeConfigOptions {
        if let Some(context) = &self.current_context {
            kubeconfig.current_context = Some(context.clone());
        }
        let options = KubeConfigOptions {
            context: self.current_context.clone(),
            ..KubeConfigOptions::default()
        };
        if !self.has_cluster_overrides() && !self.has_auth_overrides() {
            return options;
        }

        let selected = kubeconfig
            .current_context
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| OVERRIDES.to_owned());
        kubeconfig.current_context = Some(selected.clone());
        let context = context_entry(kubeconfig, &selected);
        let cluster_name = context.cluster.clone();
        let user = context.user.clone();

        if self.has_cluster_overrides() {
            let cluster = cluster_entry(kubeconfig, &cluster_name);
            if let Some(server) = &self.server {
                cluster.server = Some(server.clone());
            }
            if let Some(ca) = &self.certificate_authority {
                cluster.certificate_authority = Some(ca.clone());
                cluster.certificate_authority_data = None;
            }
            if self.insecure_skip_tls_verify {
                cluster.insecure_skip_tls_verify = Some(true);
                cluster.certificate_authority = None;
                cluster.certificate_authority_data = None;
            }
        }

        if self.has_auth_overrides() {
            let user = user.unwrap_or_else(|| selected.clone());
            let auth = auth_info_entry(kubeconfig, &user);
            if let Some(cert) = &self.client_certificate {
                auth.client_certificate = Some(cert.clone());
                auth.client_certificate_data = None;
            }
            if let Some(key) = &self.client_key {
                auth.client_key = Some(key.clone());
                auth.client_key_data = None;
            }
            if let Some(token) = &self.token {
                auth.token = Some(token.clone().into());
                auth.token_file = None;
            }
        }
        options
    }
}

/// The kubeconfig equivalent of the pod's service account.
pub fn in_cluster_kubeconfig(host: &str, port: &str) -> Result<Kubeconfig, ClientFactoryError> {
    let server = if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    };
    let kubeconfig = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "current-context": IN_CLUSTER,
        "clusters": [{
            "name": IN_CLUSTER,
            "cluster": {
                "server": server,
                "certificate-authority": format!("{SERVICE_ACCOUNT_DIR}/ca.crt"),
            },
        }],
        "users": [{
            "name": IN_CLUSTER,
            "user": { "tokenFile": format!("{SERVICE_ACCOUNT_DIR}/token") },
        }],
        "contexts": [{
            "name": IN_CLUSTER,
            "context": { "cluster": IN_CLUSTER, "user": IN_CLUSTER },
        }],
    });
    Ok(serde_json::from_value(kubeconfig)?)
}

fn in_cluster_from_env() -> Result<Kubeconfig, ClientFactoryError> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").ok();
    let port = std::env::var("KUBERNETES_SERVICE_PORT").ok();
    match (host, port) {
        (Some(host), Some(port)) if !host.is_empty() && !port.is_empty() => {
            info!("Using in-cluster configuration for API server {host}:{port}");
            in_cluster_kubeconfig(&host, &port)
        }
        _ => Err(ClientFactoryError::NoConfiguration),
    }
}

/// Pick the kubeconfig the clients are built from, without applying overrides. When no file
/// is found, a server override takes precedence over the in-cluster configuration.
pub fn resolve_kubeconfig(config: &DatastoreConfig) -> Result<Kubeconfig, ClientFactoryError> {
    if let Some(inline) = config.kubeconfig_inline.as_deref().filter(|s| !s.is_empty()) {
        debug!("Using inline kubeconfig");
        return Kubeconfig::from_yaml(inline).map_err(ClientFactoryError::InlineKubeconfig);
    }
    let loaded = match config.kubeconfig.as_deref().filter(|s| !s.is_empty()) {
        Some(spec) => {
            debug!("Loading kubeconfig from {spec}");
            LoadingRules::from_kubeconfig_spec(spec).load()?
        }
        None => match Kubeconfig::read() {
            Ok(kubeconfig) => Some(kubeconfig),
            Err(e) => {
                debug!("No default kubeconfig: {e}");
                None
            }
        },
    };
    match loaded {
        Some(kubeconfig) => Ok(kubeconfig),
        None if ConfigOverrides::from(config).server.is_some() => {
            debug!("No kubeconfig found, connecting with the configured overrides");
            Ok(Kubeconfig::default())
        }
        None => in_cluster_from_env(),
    }
}

/// Build the client configuration: resolve the kubeconfig and apply the overrides.
pub async fn client_config(config: &DatastoreConfig) -> Result<Config, ClientFactoryError> {
    let mut kubeconfig = resolve_kubeconfig(config)?;
    let options = ConfigOverrides::from(config).apply(&mut kubeconfig);
    Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(ClientFactoryError::ClientConfig)
}

/// A client scoped to one API group and version.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    group: &'static str,
    version: &'static str,
}

impl RestClient {
    fn new(
        config: Config,
        group: &'static str,
        version: &'static str,
        which: &'static str,
    ) -> Result<Self, ClientFactoryError> {
        let client =
            Client::try_from(config).map_err(|source| ClientFactoryError::BuildClient {
                which,
                source,
            })?;
        Ok(Self {
            client,
            group,
            version,
        })
    }

    #[must_use]
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    #[must_use]
    pub fn group(&self) -> &'static str {
        self.group
    }

    #[must_use]
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Describe a resource of this client's group and version.
    #[must_use]
    pub fn resource(&self, kind: &str, plural: &str) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group, self.version, kind);
        ApiResource::from_gvk_with_plural(&gvk, plural)
    }
}

/// The clients a backend talks to the API server through.
#[derive(Clone)]
pub struct ClientSet {
    /// Client for the built-in resources.
    pub core: Client,
    /// Client for the custom resources, objects are passed through as plain JSON.
    pub crd: RestClient,
    /// Client for the admin network policy resources.
    pub admin_policy: RestClient,
    /// Rate limit shared by all the clients.
    pub limiter: Arc<RateLimiter>,
}

impl ClientSet {
    pub async fn new(config: &DatastoreConfig) -> Result<Self, ClientFactoryError> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let client_config = client_config(config).await?;
        info!("Connecting to API server {}", client_config.cluster_url);

        let qps = config
            .k8s_client_qps
            .filter(|qps| *qps > 0.0)
            .unwrap_or(DEFAULT_QPS);
        debug!("Client rate limit: qps={qps} burst={DEFAULT_BURST}");

        let core = Client::try_from(client_config.clone()).map_err(|source| {
            ClientFactoryError::BuildClient {
                which: "core",
                source,
            }
        })?;
        let crd = RestClient::new(client_config.clone(), CRD_GROUP, CRD_VERSION, "CRD")?;
        let admin_policy = RestClient::new(
            client_config,
            ADMIN_POLICY_GROUP,
            ADMIN_POLICY_VERSION,
            "admin network policy",
        )?;
        Ok(Self {
            core,
            crd,
            admin_policy,
            limiter: Arc::new(RateLimiter::new(qps, DEFAULT_BURST)),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
- name: prod-cluster
  cluster:
    server: https://10.1.1.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: dev
  context:
    cluster: dev-cluster
    user: dev-user
- name: prod
  context:
    cluster: prod-cluster
    user: prod-user
users:
- name: dev-user
  user:
    token: dev-token
- name: prod-user
  user:
    token: prod-token
";

    fn cluster<'a>(kubeconfig: &'a Kubeconfig, name: &str) -> &'a Cluster {
        kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.cluster.as_ref())
            .unwrap()
    }

    #[test]
    fn test_loading_rules_single_path() {
        let rules = LoadingRules::from_kubeconfig_spec("/etc/kube/config");
        assert_eq!(
            rules,
            LoadingRules {
                explicit_path: Some(PathBuf::from("/etc/kube/config")),
                ..LoadingRules::default()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_loading_rules_precedence() {
        let rules = LoadingRules::from_kubeconfig_spec("/a:/b:/a:/c:/b");
        assert_eq!(
            rules,
            LoadingRules {
                explicit_path: None,
                precedence: vec![
                    PathBuf::from("/a"),
                    PathBuf::from("/b"),
                    PathBuf::from("/c")
                ],
                warn_if_all_missing: true,
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_loading_rules_all_missing() {
        let rules = LoadingRules::from_kubeconfig_spec("/nonexistent/a:/nonexistent/b");
        assert!(rules.load().unwrap().is_none());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let rules = LoadingRules::from_kubeconfig_spec("/nonexistent/kubeconfig");
        assert!(matches!(
            rules.load(),
            Err(ClientFactoryError::ReadKubeconfig { .. })
        ));
    }

    #[test]
    fn test_overrides_target_selected_context() {
        let mut kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        let overrides = ConfigOverrides {
            server: Some("https://10.2.2.2:443".to_owned()),
            current_context: Some("prod".to_owned()),
            certificate_authority: Some("/etc/ca.crt".to_owned()),
            ..ConfigOverrides::default()
        };
        let options = overrides.apply(&mut kubeconfig);
        assert_eq!(options.context.as_deref(), Some("prod"));
        assert_eq!(kubeconfig.current_context.as_deref(), Some("prod"));

        let prod = cluster(&kubeconfig, "prod-cluster");
        assert_eq!(prod.server.as_deref(), Some("https://10.2.2.2:443"));
        assert_eq!(prod.certificate_authority.as_deref(), Some("/etc/ca.crt"));
        // the other cluster is left alone
        let dev = cluster(&kubeconfig, "dev-cluster");
        assert_eq!(dev.server.as_deref(), Some("https://127.0.0.1:6443"));
    }

    #[test]
    fn test_overrides_without_context() {
        let mut kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        let overrides = ConfigOverrides {
            server: Some("https://10.2.2.2:443".to_owned()),
            current_context: Some("missing".to_owned()),
            ..ConfigOverrides::default()
        };
        overrides.apply(&mut kubeconfig);
        assert_eq!(
            cluster(&kubeconfig, "prod-cluster").server.as_deref(),
            Some("https://10.1.1.1:6443")
        );
        assert_eq!(
            cluster(&kubeconfig, "missing").server.as_deref(),
            Some("https://10.2.2.2:443")
        );
    }

    #[test]
    fn test_overrides_on_empty_kubeconfig() {
        let mut kubeconfig = Kubeconfig::default();
        let overrides = ConfigOverrides {
            server: Some("https://10.2.2.2:443".to_owned()),
            token: Some("secret".to_owned()),
            ..ConfigOverrides::default()
        };
        let options = overrides.apply(&mut kubeconfig);
        assert_eq!(options.context, None);
        assert_eq!(kubeconfig.current_context.as_deref(), Some(OVERRIDES));
        assert_eq!(
            cluster(&kubeconfig, OVERRIDES).server.as_deref(),
            Some("https://10.2.2.2:443")
        );
        let user = kubeconfig
            .auth_infos
            .iter()
            .find(|a| a.name == OVERRIDES)
            .and_then(|a| a.auth_info.as_ref())
            .unwrap();
        assert!(user.token.is_some());
    }

    #[test]
    fn test_in_cluster_kubeconfig() {
        let kubeconfig = in_cluster_kubeconfig("10.96.0.1", "443").unwrap();
        assert_eq!(kubeconfig.current_context.as_deref(), Some(IN_CLUSTER));
        assert_eq!(
            cluster(&kubeconfig, IN_CLUSTER).server.as_deref(),
            Some("https://10.96.0.1:443")
        );
        let kubeconfig = in_cluster_kubeconfig("fd00::1", "6443").unwrap();
        assert_eq!(
            cluster(&kubeconfig, IN_CLUSTER).server.as_deref(),
            Some("https://[fd00::1]:6443")
        );
    }

    #[tokio::test]
    async fn test_client_config_from_inline() {
        let config = DatastoreConfig {
            kubeconfig_inline: Some(KUBECONFIG.to_owned()),
            k8s_api_endpoint: Some("https://192.0.2.10:6443".to_owned()),
            k8s_api_token: Some("override".to_owned()),
            ..DatastoreConfig::default()
        };
        let client_config = client_config(&config).await.unwrap();
        assert_eq!(client_config.cluster_url.host(), Some("192.0.2.10"));
        assert_eq!(client_config.cluster_url.port_u16(), Some(6443));
        assert!(client_config.accept_invalid_certs);
        assert!(client_config.auth_info.token.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_config_from_overrides_only() {
        let config = DatastoreConfig {
            kubeconfig: Some("/nonexistent/a:/nonexistent/b".to_owned()),
            k8s_api_endpoint: Some("https://192.0.2.10:6443".to_owned()),
            k8s_api_token: Some("token".to_owned()),
            k8s_insecure_skip_tls_verify: true,
            ..DatastoreConfig::default()
        };
        let client_config = client_config(&config).await.unwrap();
        assert_eq!(client_config.cluster_url.host(), Some("192.0.2.10"));
        assert_eq!(client_config.cluster_url.port_u16(), Some(6443));
        assert!(client_config.accept_invalid_certs);
        assert!(client_config.auth_info.token.is_some());
    }

    #[tokio::test]
    async fn test_client_set() {
        let config = DatastoreConfig {
            kubeconfig_inline: Some(KUBECONFIG.to_owned()),
            k8s_client_qps: Some(-1.0),
            ..DatastoreConfig::default()
        };
        let clients = ClientSet::new(&config).await.unwrap();
        assert!((clients.limiter.qps() - f64::from(DEFAULT_QPS)).abs() < f64::EPSILON);
        assert!((clients.limiter.burst() - f64::from(DEFAULT_BURST)).abs() < f64::EPSILON);
        let pools = clients.crd.resource("IPPool", "ippools");
        assert_eq!(pools.api_version, "crd.projectcalico.org/v1");
        assert_eq!(pools.plural, "ippools");
    }
}
