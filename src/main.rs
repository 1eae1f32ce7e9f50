use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fanout::config::{ConfigLoader, DispatchConfig, OutputConfig, schema::default_test_url};
use fanout::source::{CandidateSource, EndpointSource, RepeatSource, parse_target};
use fanout::{Dispatcher, Progress, ReqwestClient, Summary, output};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::Validate;

#[derive(Parser)]
#[command(name = "fanout")]
#[command(version = "0.1.0")]
#[command(about = "Bounded-concurrency HTTP request dispatcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a fixed number of GET requests to one URL
    Load {
        /// Target URL
        #[arg(short, long)]
        url: Option<String>,

        /// Total number of requests
        #[arg(short = 'n', long)]
        requests: Option<u64>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Probe a list of proxy endpoints and rank the working ones by latency
    Probe {
        /// File with one host:port per line
        #[arg(long)]
        candidates: Option<PathBuf>,

        /// URL fetched through each candidate
        #[arg(long)]
        test_url: Option<String>,

        /// Where to write the ranked endpoints
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format; overrides the type of `probe.output` in the config [default: text]
        #[arg(long, value_enum)]
        format: Option<Format>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to a configuration file (JSON/YAML/TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent requests
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Max retries per request
    #[arg(short, long)]
    retries: Option<u32>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Base backoff between retries in milliseconds
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Csv,
    Console,
}

impl CommonArgs {
    fn resolve(&self) -> anyhow::Result<DispatchConfig> {
        let mut cfg = self.load_config()?;
        self.apply_overrides(&mut cfg);
        Ok(cfg)
    }

    fn load_config(&self) -> anyhow::Result<DispatchConfig> {
        Ok(match &self.config {
            Some(path) => {
                log::info!("Loading config from {:?}", path);
                ConfigLoader::load(path)?
            }
            None => ConfigLoader::from_env()?,
        })
    }

    fn apply_overrides(&self, cfg: &mut DispatchConfig) {
        if let Some(concurrency) = self.concurrency {
            cfg.concurrency = concurrency;
        }
        if let Some(retries) = self.retries {
            cfg.max_retries = retries;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            cfg.timeout_ms = timeout_ms;
        }
        if let Some(backoff_ms) = self.backoff_ms {
            cfg.backoff_ms = backoff_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let max_level = logger.filter();
    let multi = Arc::new(MultiProgress::new());

    let show_progress = match &cli.command {
        Commands::Load { common, .. } | Commands::Probe { common, .. } => !common.no_progress,
        Commands::Check { .. } => false,
    };
    if show_progress {
        indicatif_log_bridge::LogWrapper::new((*multi).clone(), logger).try_init()?;
    } else {
        log::set_boxed_logger(Box::new(logger))?;
    }
    log::set_max_level(max_level);
    let progress = show_progress.then(|| multi.clone());

    let result = match cli.command {
        Commands::Load {
            url,
            requests,
            common,
        } => load(url, requests, &common, progress).await,
        Commands::Probe {
            candidates,
            test_url,
            output,
            format,
            common,
        } => probe(candidates, test_url, output, format, &common, progress).await,
        Commands::Check { config } => check(&config),
    };

    log::logger().flush();
    result
}

async fn load(
    url: Option<String>,
    requests: Option<u64>,
    common: &CommonArgs,
    progress: Option<Arc<MultiProgress>>,
) -> anyhow::Result<()> {
    let mut cfg = common.resolve()?;
    if let Some(url) = url {
        cfg.url = Some(url);
    }
    if let Some(requests) = requests {
        cfg.requests = requests;
    }
    cfg.validate()?;

    let Some(raw_url) = cfg.url.as_deref() else {
        bail!("a target URL is required (--url or `url` in the config)");
    };
    let target = parse_target(raw_url)?;

    let dispatcher = build_dispatcher(&cfg)?;
    let source = Arc::new(RepeatSource::new(target, cfg.requests));
    let summary = run(&dispatcher, source, progress).await?;
    print_summary(&summary);
    Ok(())
}

async fn probe(
    candidates: Option<PathBuf>,
    test_url: Option<String>,
    output_path: Option<PathBuf>,
    format: Option<Format>,
    common: &CommonArgs,
    progress: Option<Arc<MultiProgress>>,
) -> anyhow::Result<()> {
    let mut cfg = common.load_config()?;
    cfg.apply_probe_defaults();
    common.apply_overrides(&mut cfg);
    cfg.validate()?;
    let probe_cfg = cfg.probe.clone();

    let candidates = candidates
        .or_else(|| probe_cfg.as_ref().map(|p| PathBuf::from(&p.candidates)))
        .context("a candidate list is required (--candidates or `probe.candidates` in the config)")?;
    let test_url = test_url
        .or_else(|| probe_cfg.as_ref().map(|p| p.test_url.clone()))
        .unwrap_or_else(default_test_url);
    let output_cfg = resolve_output(
        output_path.as_deref(),
        format,
        probe_cfg.and_then(|p| p.output),
    );

    let source = CandidateSource::from_file(parse_target(&test_url)?, &candidates)?;
    if source.is_empty() {
        log::warn!("No candidates found in {}", candidates.display());
    }

    let dispatcher = build_dispatcher(&cfg)?;
    log::info!(
        "{} unique candidates to probe against {} (concurrency {}, retries {})",
        source.len(),
        test_url,
        dispatcher.concurrency(),
        cfg.max_retries
    );
    let summary = run(&dispatcher, Arc::new(source), progress.clone()).await?;

    let ranked = dispatcher.rank();
    log::info!("Working endpoints: {}", ranked.len());
    let mut handler = output::create_handler(&output_cfg, progress)?;
    output::persist(handler.as_mut(), &ranked).await?;
    if let Some(path) = output_cfg.path() {
        log::info!("Saved ranked endpoints to {}", path);
    }

    print_summary(&summary);
    if !ranked.is_empty() {
        println!("   Fastest:");
        for entry in ranked.iter().take(10) {
            println!("     {} ({:.0}ms)", entry.endpoint, entry.latency_ms);
        }
    }
    Ok(())
}

fn check(config: &Path) -> anyhow::Result<()> {
    match ConfigLoader::load(config) {
        Ok(cfg) => {
            println!("✅ Config is valid:");
            println!("   Target: {}", cfg.url.as_deref().unwrap_or("-"));
            println!("   Requests: {}", cfg.requests);
            println!("   Concurrency: {}", cfg.concurrency);
            println!("   Max retries: {}", cfg.max_retries);
            if let Some(probe) = &cfg.probe {
                println!("   Probe candidates: {}", probe.candidates);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Config error: {}", e);
            std::process::exit(1);
        }
    }
}

fn output_config(format: Format, path: &Path) -> OutputConfig {
    let path = path.display().to_string();
    match format {
        Format::Text => OutputConfig::Text { path },
        Format::Json => OutputConfig::Json { path },
        Format::Csv => OutputConfig::Csv { path },
        Format::Console => OutputConfig::Console,
    }
}

/// Picks the ranking sink. An explicit `-o` wins, then the configured
/// output with its type replaced by an explicit `--format`, then
/// `Proxy.txt` as text.
fn resolve_output(
    output_path: Option<&Path>,
    format: Option<Format>,
    configured: Option<OutputConfig>,
) -> OutputConfig {
    match (output_path, format, configured) {
        (Some(path), format, _) => output_config(format.unwrap_or(Format::Text), path),
        (None, None, Some(configured)) => configured,
        (None, Some(format), configured) => {
            let path = configured
                .as_ref()
                .and_then(OutputConfig::path)
                .unwrap_or("Proxy.txt")
                .to_string();
            output_config(format, Path::new(&path))
        }
        (None, None, None) => output_config(Format::Text, Path::new("Proxy.txt")),
    }
}

fn build_dispatcher(cfg: &DispatchConfig) -> anyhow::Result<Dispatcher> {
    let client = Arc::new(ReqwestClient::new(cfg.client_settings())?);
    let dispatcher = Dispatcher::new(client, cfg.retry_policy(), cfg.concurrency)?
        .with_progress_every(cfg.progress_every);

    let stop = dispatcher.stop_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop.is_stopped() {
                log::warn!("Interrupted again, exiting without waiting for in-flight requests");
                log::logger().flush();
                std::process::exit(130);
            }
            log::info!("Shutting down... (press ctrl-c again to force)");
            stop.stop();
        }
    });
    Ok(dispatcher)
}

async fn run(
    dispatcher: &Dispatcher,
    source: Arc<dyn EndpointSource>,
    progress: Option<Arc<MultiProgress>>,
) -> anyhow::Result<Summary> {
    let Some(multi) = progress else {
        return Ok(dispatcher.run(source).await?);
    };

    let pb = multi.add(ProgressBar::new(source.total()));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let mut progress_rx = dispatcher.watch_progress();
    let pb_clone = pb.clone();
    let progress_task = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let snapshot: Progress = progress_rx.borrow().clone();
            pb_clone.set_position(snapshot.completed);
            pb_clone.set_message(format!(
                "Success: {:.1}% | RPS: {:.2} | Active: {}",
                snapshot.success_rate * 100.0,
                snapshot.requests_per_second,
                snapshot.active_workers
            ));
        }
    });

    let summary = dispatcher.run(source).await;
    progress_task.abort();

    let final_progress = dispatcher.progress();
    pb.set_style(
        ProgressStyle::default_bar()
            .template("✅ [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_position(final_progress.completed);
    pb.finish_with_message(format!(
        "Success: {:.1}% | RPS: {:.2} - Completed",
        final_progress.success_rate * 100.0,
        final_progress.requests_per_second
    ));

    Ok(summary?)
}

fn print_summary(summary: &Summary) {
    println!("\n✅ Dispatch Completed:");
    println!("   Requests Completed: {}/{}", summary.completed, summary.target);
    println!("   Succeeded: {}  Failed: {}", summary.success, summary.failure);
    println!("   Success Rate: {:.2}%", summary.success_rate * 100.0);
    println!("   Requests per Second: {:.2}", summary.throughput);
    println!("   Average Latency: {}ms", summary.avg_latency_ms);
    println!("   Total Time: {:.2}s", summary.elapsed_seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(path: &str) -> OutputConfig {
        OutputConfig::Csv {
            path: path.to_string(),
        }
    }

    #[test]
    fn output_defaults_to_proxy_txt() {
        assert_eq!(
            resolve_output(None, None, None),
            OutputConfig::Text {
                path: "Proxy.txt".to_string()
            }
        );
    }

    #[test]
    fn configured_output_is_kept_without_flags() {
        assert_eq!(resolve_output(None, None, Some(csv("ranked.csv"))), csv("ranked.csv"));
    }

    #[test]
    fn explicit_format_overrides_configured_type() {
        assert_eq!(
            resolve_output(None, Some(Format::Json), Some(csv("ranked.csv"))),
            OutputConfig::Json {
                path: "ranked.csv".to_string()
            }
        );
        assert_eq!(
            resolve_output(None, Some(Format::Json), Some(OutputConfig::Console)),
            OutputConfig::Json {
                path: "Proxy.txt".to_string()
            }
        );
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            resolve_output(Some(Path::new("out.csv")), Some(Format::Csv), Some(OutputConfig::Console)),
            csv("out.csv")
        );
    }
}
