//! `tinyfish`: run web agent automations from the command line.
//!
//! Results are printed to stdout as JSON; logs go to stderr (or to
//! `TINYFISH_JSON_LOG_PATH`).

mod cli;
mod commands;
mod observability;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser as _;
use webagent_client::{ClientConfig, StaticApiKey, WebAgentClient};

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine: the key may already be in the environment.
    let _ = dotenvy::dotenv();
    let args = cli::Args::parse();
    observability::LogSettings::from_env(args.verbose).install();

    match real_main(args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn real_main(args: cli::Args) -> anyhow::Result<String> {
    let mut config = ClientConfig::from_env();
    if let Some(base_url) = args.base_url {
        config = config.base_url(base_url);
    }
    let mut builder = WebAgentClient::builder().config(config);
    if let Some(key) = args.api_key {
        builder = builder.credentials(Arc::new(StaticApiKey::new(key)?));
    }
    let client = builder.build()?;
    let value = commands::execute(&client, args.command).await?;
    Ok(serde_json::to_string_pretty(&value)?)
}
