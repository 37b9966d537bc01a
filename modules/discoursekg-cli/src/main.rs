//! Operational CLI for the DiscourseKG pipeline.
//!
//! Exit codes: 0 when every item in the invocation succeeded (or there was
//! nothing to do), 1 when at least one item failed, 2 for operator errors
//! (bad arguments, missing configuration).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use discoursekg_common::{Config, DiscourseKgError, Stage, SpeakerRegistry};
use discoursekg_graph::{GraphClient, GraphStage, GraphWriter};
use discoursekg_ingest::{
    CategorizeProcessor, Claude, HttpScraper, ScrapeProcessor, SourceDiscoverer,
    SummarizeProcessor,
};
use discoursekg_runtime::{
    DiscoveryRequest, PipelineRuntime, RuntimeOptions, StageProcessor, StageReport,
};
use discoursekg_store::{ArtifactStore, StateJournal};

#[derive(Parser)]
#[command(name = "discoursekg", about = "DiscourseKG ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one pipeline stage across all ready items
    Run {
        #[command(subcommand)]
        stage: RunCommand,
    },
    /// Item counts by next stage
    Status {
        /// Only count items waiting on this stage
        #[arg(long)]
        stage: Option<String>,
        /// List items with a recorded failure
        #[arg(long)]
        failed: bool,
    },
    /// Exclude an item from future runs without deleting it
    Invalidate {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum RunCommand {
    /// Discover new communications for a speaker in a date range
    Discover {
        #[arg(long)]
        speaker: String,
        /// Start of the range, YYYY-MM-DD
        #[arg(long)]
        from: String,
        /// End of the range, YYYY-MM-DD
        #[arg(long)]
        to: String,
    },
    Scrape(StageArgs),
    Summarize(StageArgs),
    Categorize(StageArgs),
    Graph(StageArgs),
}

#[derive(Args)]
struct StageArgs {
    /// Max items processed concurrently
    #[arg(long)]
    fanout: Option<usize>,
    /// Per-item timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new("discoursekg=info")),
        )
        .init();

    let cli = Cli::parse();
    info!("DiscourseKG pipeline starting...");
    let code = match cli.command {
        Command::Run { stage } => run(stage).await,
        Command::Status { stage, failed } => status(stage, failed),
        Command::Invalidate { id } => invalidate(&id),
    };
    std::process::exit(code);
}

async fn run(command: RunCommand) -> i32 {
    match command {
        RunCommand::Discover { speaker, from, to } => run_discover(speaker, &from, &to).await,
        RunCommand::Scrape(args) => {
            let config = load_config(Config::from_env);
            let processor = ScrapeProcessor::new(HttpScraper::new());
            run_stage(config, args, &processor).await
        }
        RunCommand::Summarize(args) => {
            let config = load_config(Config::ingest_from_env);
            let processor = SummarizeProcessor::new(claude(&config), config.summary_target_words);
            run_stage(config, args, &processor).await
        }
        RunCommand::Categorize(args) => {
            let config = load_config(Config::ingest_from_env);
            let processor = CategorizeProcessor::new(claude(&config));
            run_stage(config, args, &processor).await
        }
        RunCommand::Graph(args) => {
            let config = load_config(Config::graph_from_env);
            let registry = load_registry(&config);
            let client = match GraphClient::connect(
                &config.graph_url,
                &config.graph_user,
                &config.graph_password,
            )
            .await
            {
                Ok(client) => client,
                Err(e) => {
                    eprintln!("error: cannot connect to graph store: {e}");
                    return 1;
                }
            };
            let processor = GraphStage::new(GraphWriter::new(client), registry);
            run_stage(config, args, &processor).await
        }
    }
}

async fn run_discover(speaker: String, from: &str, to: &str) -> i32 {
    let config = load_config(Config::ingest_from_env);
    let registry = load_registry(&config);
    config.log_redacted();

    let start_date = parse_date(from);
    let end_date = parse_date(to);
    if end_date < start_date {
        eprintln!("error: --to is before --from");
        return 2;
    }

    let discoverer = SourceDiscoverer::new(claude(&config), HttpScraper::new(), registry);
    let runtime = runtime(&config, RuntimeOptions::default());
    let request = DiscoveryRequest {
        speaker,
        start_date,
        end_date,
    };
    finish(runtime.run_discover(&request, &discoverer).await)
}

async fn run_stage(config: Config, args: StageArgs, processor: &dyn StageProcessor) -> i32 {
    let mut options = RuntimeOptions {
        fanout: config.fanout,
        stage_timeout: Duration::from_secs(config.stage_timeout_secs),
    };
    if let Some(fanout) = args.fanout {
        options.fanout = fanout;
    }
    if let Some(timeout) = args.timeout {
        options.stage_timeout = Duration::from_secs(timeout);
    }

    let runtime = runtime(&config, options);
    finish(runtime.run_stage(processor).await)
}

fn status(stage_filter: Option<String>, failed: bool) -> i32 {
    let config = load_config(Config::from_env);
    let journal = open_journal(&config);

    let stage_filter = stage_filter.map(|s| parse_stage(&s));
    let mut by_stage: BTreeMap<String, u32> = BTreeMap::new();
    let mut complete = 0u32;
    let mut invalidated = 0u32;
    for state in journal.all() {
        if state.invalidated {
            invalidated += 1;
            continue;
        }
        match state.next_stage {
            Some(stage) => {
                if stage_filter.is_none() || stage_filter == Some(stage) {
                    *by_stage.entry(stage.to_string()).or_insert(0) += 1;
                }
            }
            None => complete += 1,
        }
    }

    println!("Pipeline status (environment: {})", config.environment);
    for stage in Stage::SEQUENCE {
        if let Some(count) = by_stage.get(&stage.to_string()) {
            println!("  {stage:<12} {count}");
        }
    }
    if stage_filter.is_none() {
        println!("  {:<12} {complete}", "complete");
        if invalidated > 0 {
            println!("  {:<12} {invalidated}", "invalidated");
        }
    }

    if failed {
        println!("\nFailed items:");
        for state in journal.failed() {
            println!(
                "  {} [{}] {}",
                state.id,
                state
                    .next_stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                state.error_message.as_deref().unwrap_or("")
            );
        }
    }
    0
}

fn invalidate(id: &str) -> i32 {
    let config = load_config(Config::from_env);
    let journal = open_journal(&config);
    match journal.invalidate(id) {
        Ok(state) => {
            println!("invalidated {}", state.id);
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            2
        }
    }
}

// --- helpers ---

fn load_config(loader: fn() -> Result<Config, DiscourseKgError>) -> Config {
    loader().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(2);
    })
}

fn load_registry(config: &Config) -> SpeakerRegistry {
    SpeakerRegistry::load(&config.speakers_file()).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(2);
    })
}

fn open_journal(config: &Config) -> Arc<StateJournal> {
    match StateJournal::open(config.pipeline_state_file()) {
        Ok(journal) => Arc::new(journal),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn runtime(config: &Config, options: RuntimeOptions) -> PipelineRuntime {
    let journal = open_journal(config);
    let store = ArtifactStore::new(config.data_root.clone(), config.environment.clone());
    PipelineRuntime::new(journal, store, options)
}

fn claude(config: &Config) -> Claude {
    Claude::new(config.llm_api_key.clone(), config.llm_model.clone())
}

fn parse_date(s: &str) -> chrono::NaiveDate {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| {
        eprintln!("error: invalid date '{s}', expected YYYY-MM-DD");
        std::process::exit(2);
    })
}

fn parse_stage(s: &str) -> Stage {
    s.parse().unwrap_or_else(|e: String| {
        eprintln!("error: {e}");
        std::process::exit(2);
    })
}

fn finish(result: Result<StageReport, DiscourseKgError>) -> i32 {
    match result {
        Ok(report) => {
            println!("{report}");
            report.exit_code()
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}
