use std::collections::BTreeSet;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use kube::api::{Api, ListParams};
use organization_core::Organization;

use super::{GlobalArgs, OutputFormat};
use crate::kubeconfig;
use crate::report::StatusReport;

pub(super) async fn status(args: &GlobalArgs, output: OutputFormat) -> Result<()> {
    let config = args.resolve_config()?;
    let client = kubeconfig::connect(&config.kubernetes).await?;

    let organizations = Api::<Organization>::all(client.clone())
        .list(&ListParams::default())
        .await
        .context("Failed to list organizations")?;
    let namespaces: BTreeSet<String> = Api::<Namespace>::all(client)
        .list(&ListParams::default())
        .await
        .context("Failed to list namespaces")?
        .items
        .iter()
        .map(ResourceExt::name_any)
        .collect();

    let forbidden = &config.reconciler.forbidden_prefixes;
    let report = StatusReport::build(
        &organizations.items,
        &namespaces,
        &config.reconciler.finalizer,
        |name| forbidden.is_forbidden(name),
    );

    match output {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Toml => print!("{}", report.to_toml()?),
    }
    Ok(())
}
