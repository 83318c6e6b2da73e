use anyhow::Result;
use tracing::info;

use super::GlobalArgs;
use crate::{controller, kubeconfig};

pub(super) async fn run(args: &GlobalArgs) -> Result<()> {
    let config = args.resolve_config()?;
    info!(
        version = organization_core::VERSION,
        resync_secs = config.resync_period_secs,
        legacy = config.legacy.enabled(),
        "starting {}",
        organization_core::PROJECT_NAME
    );
    let client = kubeconfig::connect(&config.kubernetes).await?;
    controller::run(client, config).await
}
