//! Cluster connection detection
//!
//! Priority order: in-cluster service account when asked for, then an
//! explicit kubeconfig file, then whatever `kube::Config::infer` finds
//! (`KUBECONFIG`, `~/.kube/config`, in-cluster environment).

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::info;

use crate::config::KubernetesConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterSource {
    InCluster,
    Kubeconfig(PathBuf),
    Inferred,
}

impl ClusterSource {
    pub fn detect(config: &KubernetesConfig) -> Self {
        if config.in_cluster {
            return Self::InCluster;
        }
        match &config.kubeconfig {
            Some(path) => Self::Kubeconfig(path.clone()),
            None => Self::Inferred,
        }
    }
}

impl fmt::Display for ClusterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InCluster => write!(f, "in-cluster service account"),
            Self::Kubeconfig(path) => write!(f, "kubeconfig {}", path.display()),
            Self::Inferred => write!(f, "inferred configuration"),
        }
    }
}

/// Build a client for the cluster selected by `config`
pub async fn connect(config: &KubernetesConfig) -> Result<Client> {
    let source = ClusterSource::detect(config);
    info!(%source, "connecting to cluster");

    let kube_config = match &source {
        ClusterSource::InCluster => {
            kube::Config::incluster().context("Failed to load in-cluster configuration")?
        }
        ClusterSource::Kubeconfig(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .with_context(|| format!("Failed to load kubeconfig {}", path.display()))?
        }
        ClusterSource::Inferred => kube::Config::infer()
            .await
            .context("Failed to infer cluster configuration")?,
    };

    Client::try_from(kube_config).context("Failed to create Kubernetes client")
}
