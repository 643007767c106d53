use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use webagent_client::{BrowserProfile, ProxyCountry, RunStatus, StreamTimeout};

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Stream progress events and wait for the terminal event.
    #[default]
    Sse,
    /// Block on a single request until the run finishes.
    Sync,
    /// Submit the run and return its id immediately.
    Async,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfileArg {
    #[default]
    Lite,
    Stealth,
}

impl From<ProfileArg> for BrowserProfile {
    fn from(value: ProfileArg) -> Self {
        match value {
            ProfileArg::Lite => BrowserProfile::Lite,
            ProfileArg::Stealth => BrowserProfile::Stealth,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusArg {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<StatusArg> for RunStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => RunStatus::Pending,
            StatusArg::Running => RunStatus::Running,
            StatusArg::Completed => RunStatus::Completed,
            StatusArg::Failed => RunStatus::Failed,
            StatusArg::Cancelled => RunStatus::Cancelled,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tinyfish", version, about = "Run TinyFish web agent automations")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the API base URL (defaults to TINYFISH_BASE_URL or the public API).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// API key to use instead of TINYFISH_API_KEY.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Log more detail to stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunOptions {
    #[arg(long, value_enum, default_value_t = RunMode::Sse)]
    pub mode: RunMode,

    /// Client-side deadline for streamed runs, in seconds.
    #[arg(
        long,
        default_value_t = StreamTimeout::DEFAULT_SECS,
        value_parser = clap::value_parser!(u64).range(30..=600)
    )]
    pub timeout: u64,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub url: String,

    /// Natural-language instructions for the agent.
    #[arg(long)]
    pub goal: String,

    #[arg(long, value_enum, default_value_t = ProfileArg::Lite)]
    pub browser_profile: ProfileArg,

    /// Route the browser through a proxy.
    #[arg(long, default_value_t = false)]
    pub proxy: bool,

    /// Proxy exit country (AU, CA, FR, DE, JP, GB, US).
    #[arg(long, requires = "proxy", value_parser = parse_country)]
    pub proxy_country: Option<ProxyCountry>,

    #[command(flatten)]
    pub options: RunOptions,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BatchArgs {
    /// JSONL file, one `{"url", "goal", ...}` object per line.
    #[arg(long)]
    pub file: PathBuf,

    #[arg(
        long,
        default_value_t = 4,
        value_parser = clap::value_parser!(u16).range(1..=64)
    )]
    pub concurrency: u16,

    /// Report failed items as `{"error": ...}` instead of stopping.
    #[arg(long, default_value_t = false)]
    pub continue_on_fail: bool,

    #[command(flatten)]
    pub options: RunOptions,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GetRunArgs {
    pub run_id: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListRunsArgs {
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    #[arg(
        long,
        default_value_t = 20,
        value_parser = clap::value_parser!(u32).range(1..=100)
    )]
    pub limit: u32,

    #[arg(long)]
    pub cursor: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one automation.
    Run(RunArgs),
    /// Run every automation listed in a JSONL file.
    Batch(BatchArgs),
    /// Fetch a run by id.
    GetRun(GetRunArgs),
    /// List recent runs.
    ListRuns(ListRunsArgs),
}

fn parse_country(raw: &str) -> Result<ProxyCountry, String> {
    ProxyCountry::parse(raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_to_streamed_mode_and_default_timeout() {
        let args = Args::try_parse_from([
            "tinyfish",
            "run",
            "--url",
            "https://example.com",
            "--goal",
            "Read the title",
        ])
        .expect("args");
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.options.mode, RunMode::Sse);
                assert_eq!(run.options.timeout, 300);
                assert_eq!(run.browser_profile, ProfileArg::Lite);
                assert!(!run.proxy);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn timeout_outside_range_is_rejected() {
        for bad in ["29", "601"] {
            let result = Args::try_parse_from([
                "tinyfish", "run", "--url", "https://a.test", "--goal", "g", "--timeout", bad,
            ]);
            assert!(result.is_err(), "timeout {bad} should be rejected");
        }
    }

    #[test]
    fn proxy_country_requires_proxy_flag() {
        let result = Args::try_parse_from([
            "tinyfish",
            "run",
            "--url",
            "https://a.test",
            "--goal",
            "g",
            "--proxy-country",
            "JP",
        ]);
        assert!(result.is_err());

        let args = Args::try_parse_from([
            "tinyfish",
            "run",
            "--url",
            "https://a.test",
            "--goal",
            "g",
            "--proxy",
            "--proxy-country",
            "jp",
        ])
        .expect("args");
        match args.command {
            Commands::Run(run) => assert_eq!(run.proxy_country, Some(ProxyCountry::Jp)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn list_runs_limit_is_bounded() {
        assert!(Args::try_parse_from(["tinyfish", "list-runs", "--limit", "0"]).is_err());
        assert!(Args::try_parse_from(["tinyfish", "list-runs", "--limit", "101"]).is_err());
        let args = Args::try_parse_from(["tinyfish", "list-runs", "--status", "failed"])
            .expect("args");
        match args.command {
            Commands::ListRuns(list) => {
                assert_eq!(list.limit, 20);
                assert_eq!(list.status, Some(StatusArg::Failed));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
