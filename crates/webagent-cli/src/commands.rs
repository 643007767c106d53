use std::path::Path;

use anyhow::Context as _;
use futures::{StreamExt as _, TryStreamExt as _};
use serde_json::Value;
use tracing::{info, warn};
use webagent_client::{
    BrowserProfile, ListRunsQuery, ProtocolEvent, ProxyCountry, RunRequest, StreamTimeout,
    WebAgentClient,
};

use crate::cli::{BatchArgs, Commands, GetRunArgs, ListRunsArgs, RunArgs, RunMode, RunOptions};

/// Executes one CLI command and returns the JSON to print on stdout.
pub async fn execute(client: &WebAgentClient, command: Commands) -> anyhow::Result<Value> {
    match command {
        Commands::Run(args) => run_one(client, args).await,
        Commands::Batch(args) => run_batch(client, args).await,
        Commands::GetRun(GetRunArgs { run_id }) => {
            let record = client
                .get_run(&run_id)
                .await
                .with_context(|| format!("failed to fetch run {run_id}"))?;
            Ok(serde_json::to_value(record)?)
        }
        Commands::ListRuns(args) => list_runs(client, args).await,
    }
}

async fn run_one(client: &WebAgentClient, args: RunArgs) -> anyhow::Result<Value> {
    let mut builder = RunRequest::builder(args.url, args.goal)
        .browser_profile(args.browser_profile.into());
    if args.proxy {
        builder = builder.proxy(args.proxy_country);
    }
    let request = builder.build()?;
    dispatch(client, &request, &args.options).await
}

async fn dispatch(
    client: &WebAgentClient,
    request: &RunRequest,
    options: &RunOptions,
) -> anyhow::Result<Value> {
    match options.mode {
        RunMode::Sse => {
            let timeout = StreamTimeout::new(options.timeout)?;
            let url = request.url().to_string();
            let outcome = client
                .run_streamed_with(request, timeout, |event| log_event(&url, event))
                .await?;
            Ok(outcome.to_json())
        }
        RunMode::Sync => Ok(serde_json::to_value(client.run_sync(request).await?)?),
        RunMode::Async => Ok(serde_json::to_value(client.run_async(request).await?)?),
    }
}

fn log_event(url: &str, event: &ProtocolEvent) {
    match event {
        ProtocolEvent::Started { run_id } => {
            info!(event = "run.started", url = url, run_id = %run_id);
        }
        ProtocolEvent::StreamingUrlAnnounced { url: live } => {
            info!(event = "run.streaming_url", url = url, streaming_url = %live);
        }
        ProtocolEvent::Progress { purpose } => {
            info!(event = "run.progress", url = url, purpose = %purpose);
        }
        ProtocolEvent::Complete(complete) => {
            info!(
                event = "run.complete",
                url = url,
                status = complete.status.as_deref().unwrap_or("FAILED")
            );
        }
    }
}

/// One line of a batch file.
#[derive(Debug, serde::Deserialize)]
struct BatchItem {
    url: String,
    goal: String,
    #[serde(default)]
    browser_profile: BrowserProfile,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    proxy_country: Option<String>,
}

impl BatchItem {
    fn into_request(self) -> anyhow::Result<RunRequest> {
        let country = self
            .proxy_country
            .as_deref()
            .map(ProxyCountry::parse)
            .transpose()?;
        let mut builder =
            RunRequest::builder(self.url, self.goal).browser_profile(self.browser_profile);
        if self.proxy || country.is_some() {
            builder = builder.proxy(country);
        }
        Ok(builder.build()?)
    }
}

fn parse_batch(text: &str) -> Vec<anyhow::Result<RunRequest>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<BatchItem>(line)
                .with_context(|| format!("line {}: invalid batch item", idx + 1))
                .and_then(BatchItem::into_request)
        })
        .collect()
}

async fn read_batch(path: &Path) -> anyhow::Result<Vec<anyhow::Result<RunRequest>>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read batch file {}", path.display()))?;
    Ok(parse_batch(&text))
}

async fn run_batch(client: &WebAgentClient, args: BatchArgs) -> anyhow::Result<Value> {
    let items = read_batch(&args.file).await?;
    info!(
        event = "batch.started",
        items = items.len() as u64,
        concurrency = args.concurrency,
        continue_on_fail = args.continue_on_fail
    );
    let options = &args.options;
    let continue_on_fail = args.continue_on_fail;

    // `buffered` keeps output in input order while runs overlap.
    let results = futures::stream::iter(items.into_iter().enumerate())
        .map(|(idx, item)| async move {
            let result = match item {
                Ok(request) => dispatch(client, &request, options).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(value) => Ok(value),
                Err(err) if continue_on_fail => {
                    warn!(
                        event = "batch.item_failed",
                        index = idx as u64,
                        error = %format!("{err:#}")
                    );
                    Ok(failure_value(&err))
                }
                Err(err) => Err(err.context(format!("batch item {} failed", idx + 1))),
            }
        })
        .buffered(usize::from(args.concurrency));

    let values: Vec<Value> = results.try_collect().await?;
    Ok(Value::Array(values))
}

/// JSON reported for a failed item when the batch continues past failures.
fn failure_value(err: &anyhow::Error) -> Value {
    if let Some(outcome) = err
        .downcast_ref::<webagent_client::ClientError>()
        .and_then(|e| e.timeout_outcome())
    {
        return outcome.to_json();
    }
    serde_json::json!({ "error": format!("{err:#}") })
}

async fn list_runs(client: &WebAgentClient, args: ListRunsArgs) -> anyhow::Result<Value> {
    let mut query = ListRunsQuery::default().limit(args.limit);
    if let Some(status) = args.status {
        query = query.status(status.into());
    }
    if let Some(cursor) = args.cursor {
        query = query.cursor(cursor);
    }
    let page = client.list_runs(&query).await?;
    Ok(serde_json::to_value(page)?)
}
