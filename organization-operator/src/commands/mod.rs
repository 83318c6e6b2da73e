//! Command line surface
//!
//! - `run`: start the controller
//! - `crd`: print the CustomResourceDefinition
//! - `status`: report organizations and their namespaces
//! - `config`: print the effective configuration

mod run;
mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kube::CustomResourceExt;
use organization_core::Organization;

use crate::config::OperatorConfig;

#[derive(Debug, Parser)]
#[command(
    name = "organization-operator",
    version = organization_core::VERSION,
    about = "Materializes Organization resources as org-<name> namespaces"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every subcommand; they override the config file
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Operator configuration file (TOML)
    #[arg(long, short, global = true, env = "ORGANIZATION_OPERATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Kubeconfig to use instead of the inferred one
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Use the pod service account
    #[arg(long, global = true)]
    pub in_cluster: bool,

    /// Base URL of the legacy companyd service
    #[arg(long, global = true, env = "COMPANYD_ADDRESS")]
    pub companyd_address: Option<String>,

    /// Base URL of the legacy credentiald service
    #[arg(long, global = true, env = "CREDENTIALD_ADDRESS")]
    pub credentiald_address: Option<String>,

    /// Strip finalizers from organization namespaces before deleting them
    #[arg(long, global = true)]
    pub force_delete_namespaces: bool,

    /// Base domain written to the organization values config map
    #[arg(long, global = true, env = "BASE_DOMAIN")]
    pub base_domain: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    pub log_json: bool,
}

impl GlobalArgs {
    /// Config file (or defaults) with command line overrides applied
    pub fn resolve_config(&self) -> Result<OperatorConfig> {
        let mut config = OperatorConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn apply(&self, config: &mut OperatorConfig) {
        if self.in_cluster {
            config.kubernetes.in_cluster = true;
        }
        if let Some(path) = &self.kubeconfig {
            config.kubernetes.kubeconfig = Some(path.clone());
        }
        if let Some(address) = &self.companyd_address {
            config.legacy.companyd_address = Some(address.clone());
        }
        if let Some(address) = &self.credentiald_address {
            config.legacy.credentiald_address = Some(address.clone());
        }
        if self.force_delete_namespaces {
            config.reconciler.force_delete_namespaces = true;
        }
        if let Some(domain) = &self.base_domain {
            config.reconciler.base_domain = Some(domain.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Toml,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the controller until SIGINT/SIGTERM
    Run,

    /// Print the Organization CRD as YAML
    Crd,

    /// Report organizations, their namespaces and deletion state
    Status {
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Print the effective configuration as TOML
    Config,
}

pub fn crd_yaml() -> Result<String> {
    serde_yaml::to_string(&Organization::crd()).context("Failed to render CRD")
}

pub async fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crd => {
            print!("{}", crd_yaml()?);
            Ok(())
        }
        Commands::Config => {
            let config = cli.global.resolve_config()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Run => run::run(&cli.global).await,
        Commands::Status { output } => status::status(&cli.global, output).await,
    }
}
