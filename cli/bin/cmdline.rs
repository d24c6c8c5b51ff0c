// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Cmd line of kddctl

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use k8s_backend::DatastoreConfig;

pub(crate) const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(name = "kddctl")]
#[command(about = "Inspect and clean a Kubernetes-backed Calico datastore", long_about = None)]
pub struct Cmdline {
    #[arg(
        long,
        value_name = "PATH",
        help = "Datastore configuration file (YAML). Replaces the settings from the environment"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILTER",
        default_value = DEFAULT_LOG_LEVEL,
        help = "Log level or tracing filter directives, e.g. info or kdd_k8s_backend=debug"
    )]
    pub log_level: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection flags. Each one overrides the matching configuration setting.
#[derive(Args)]
pub struct ConnectionArgs {
    #[arg(long, value_name = "PATH", help = "Path(s) to kubeconfig files")]
    pub kubeconfig: Option<String>,

    #[arg(long, value_name = "NAME", help = "Kubeconfig context to use")]
    pub context: Option<String>,

    #[arg(long, value_name = "URL", help = "Address of the API server")]
    pub api_endpoint: Option<String>,

    #[arg(long, value_name = "PATH", help = "Client certificate file")]
    pub cert_file: Option<String>,

    #[arg(long, value_name = "PATH", help = "Client key file")]
    pub key_file: Option<String>,

    #[arg(long, value_name = "PATH", help = "Certificate authority file")]
    pub ca_file: Option<String>,

    #[arg(long, value_name = "TOKEN", help = "Bearer token for the API server")]
    pub api_token: Option<String>,

    #[arg(long, help = "Do not verify the certificate of the API server")]
    pub insecure_skip_tls_verify: bool,

    #[arg(long, value_name = "QPS", help = "Client-side request rate limit")]
    pub qps: Option<f32>,

    #[arg(long, help = "Take IPAM from the pod CIDRs of the nodes")]
    pub use_pod_cidr: bool,
}

impl ConnectionArgs {
    pub fn apply(&self, config: &mut DatastoreConfig) {
        let overrides = [
            (&self.kubeconfig, &mut config.kubeconfig),
            (&self.context, &mut config.k8s_current_context),
            (&self.api_endpoint, &mut config.k8s_api_endpoint),
            (&self.cert_file, &mut config.k8s_cert_file),
            (&self.key_file, &mut config.k8s_key_file),
            (&self.ca_file, &mut config.k8s_ca_file),
            (&self.api_token, &mut config.k8s_api_token),
        ];
        for (flag, setting) in overrides {
            if flag.is_some() {
                setting.clone_from(flag);
            }
        }
        if self.qps.is_some() {
            config.k8s_client_qps = self.qps;
        }
        config.k8s_insecure_skip_tls_verify |= self.insecure_skip_tls_verify;
        config.k8s_use_pod_cidr |= self.use_pod_cidr;
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Check that the datastore is ready
    Ready,
    /// Show one resource
    Get {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        namespace: Option<String>,
        name: String,
    },
    /// List the resources of one kind
    List {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Show the configuration values derived for hosts
    HostConfig {
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete all the data that can be created through the datastore
    Clean,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cmdline = Cmdline::parse_from([
            "kddctl",
            "--context",
            "prod",
            "--qps",
            "20",
            "--use-pod-cidr",
            "list",
            "--kind",
            "IPPool",
        ]);
        let mut config = DatastoreConfig {
            kubeconfig: Some("/etc/kube/config".to_owned()),
            k8s_current_context: Some("dev".to_owned()),
            ..DatastoreConfig::default()
        };
        cmdline.connection.apply(&mut config);
        assert_eq!(config.kubeconfig.as_deref(), Some("/etc/kube/config"));
        assert_eq!(config.k8s_current_context.as_deref(), Some("prod"));
        assert!(
            config
                .k8s_client_qps
                .is_some_and(|qps| (qps - 20.0).abs() < f32::EPSILON)
        );
        assert!(config.k8s_use_pod_cidr);
        assert!(!config.k8s_insecure_skip_tls_verify);
        assert!(matches!(
            cmdline.command,
            Command::List { ref kind, namespace: None } if kind == "IPPool"
        ));
    }

    #[test]
    fn test_get_arguments() {
        let cmdline = Cmdline::parse_from([
            "kddctl",
            "get",
            "--kind",
            "NetworkPolicy",
            "--namespace",
            "prod",
            "deny-all",
        ]);
        assert_eq!(cmdline.log_level, DEFAULT_LOG_LEVEL);
        let Command::Get {
            kind,
            namespace,
            name,
        } = cmdline.command
        else {
            panic!("expected a get command");
        };
        assert_eq!(kind, "NetworkPolicy");
        assert_eq!(namespace.as_deref(), Some("prod"));
        assert_eq!(name, "deny-all");
    }
}
