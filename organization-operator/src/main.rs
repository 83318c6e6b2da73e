use anyhow::Result;
use clap::Parser;
use organization_operator::commands::{Cli, handle_command};
use organization_operator::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.global.log_json);
    handle_command(cli).await
}
