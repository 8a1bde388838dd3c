//! triage-monitor - issue triage monitoring service
//!
//! Runs the triage pipeline with health checks, metrics and alerting, and
//! offers one-shot commands for analysis, self-tests and quota checks.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use triage_analysis::{run_self_test, Analyzer, SelfTestCorpus};
use triage_client::RateLimitedClient;
use triage_monitor::{IssueEvent, Monitor, MonitorConfig};

#[derive(Parser)]
#[command(name = "triage-monitor")]
#[command(about = "Issue triage monitoring service")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring service until interrupted
    Run {
        /// Path to config file (defaults apply when omitted)
        #[arg(short, long, env = "TRIAGE_CONFIG")]
        config: Option<PathBuf>,

        /// Read issue events as JSON lines from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// Analyze one issue and print the suggested labels
    Analyze {
        /// Issue title
        #[arg(long)]
        title: String,

        /// Issue body
        #[arg(long, default_value = "")]
        body: String,

        /// Config file supplying the analyzer rules
        #[arg(short, long, env = "TRIAGE_CONFIG")]
        config: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the analyzer against a labeled corpus
    SelfTest {
        /// Corpus file (JSON); the built-in corpus is used when omitted
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Fail when accuracy is below this value
        #[arg(long, default_value_t = 0.85)]
        min_accuracy: f64,
    },

    /// Show the provider's current quota
    Quota {
        /// Path to config file
        #[arg(short, long, env = "TRIAGE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Generate a config file with every default spelled out
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "triage-monitor.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Run { config, stdin } => {
            run_service(config.as_deref(), stdin).await?;
        }

        Commands::Analyze {
            title,
            body,
            config,
            json,
        } => {
            analyze(&title, &body, config.as_deref(), json)?;
        }

        Commands::SelfTest {
            corpus,
            min_accuracy,
        } => {
            self_test(corpus.as_deref(), min_accuracy)?;
        }

        Commands::Quota { config } => {
            quota(config.as_deref()).await?;
        }

        Commands::InitConfig { output, force } => {
            init_config(&output, force)?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("triage=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MonitorConfig> {
    Ok(match path {
        Some(path) => {
            info!(config = %path.display(), "loading config");
            MonitorConfig::load(path)?
        }
        None => MonitorConfig::default(),
    })
}

async fn run_service(config_path: Option<&Path>, read_stdin: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if config.dry_run {
        warn!("dry run: labels are applied to an in-memory provider");
    }

    let monitor = Monitor::start(config)?;

    if read_stdin {
        tokio::select! {
            result = process_stdin(&monitor) => result?,
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("interrupt received");
    }

    monitor.shutdown().await;

    let report = monitor.status_report();
    info!(
        emitted = report.alert_stats.emitted,
        active = report.alert_stats.active,
        suppressed = report.alert_stats.suppressed_cooldown + report.alert_stats.suppressed_rate_limit,
        "final alert counts"
    );
    Ok(())
}

async fn process_stdin(monitor: &Monitor) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: IssueEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "skipping malformed event");
                continue;
            }
        };

        match monitor.pipeline().process_issue(&event).await {
            Ok(outcome) => println!("{}", serde_json::to_string(&outcome)?),
            Err(e) => error!(issue = event.number, error = %e, "triage failed"),
        }
    }

    info!("input closed");
    Ok(())
}

fn analyze(title: &str, body: &str, config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let analyzer = match config_path {
        Some(path) => Analyzer::new(load_config(Some(path))?.analysis)?,
        None => Analyzer::shared().clone(),
    };
    let result = analyzer.analyze(title, body);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Labels:");
    if result.labels().is_empty() {
        println!("  (none)");
    }
    for label in result.labels() {
        println!("  {label}");
    }
    println!("Priority:   {}", result.priority().as_str());
    println!("Security:   {}", result.security_flag());
    println!("Confidence: {:.2}", result.confidence());
    Ok(())
}

fn self_test(corpus_path: Option<&Path>, min_accuracy: f64) -> anyhow::Result<()> {
    let corpus = match corpus_path {
        Some(path) => SelfTestCorpus::from_json(&std::fs::read_to_string(path)?)?,
        None => SelfTestCorpus::builtin(),
    };

    let report = run_self_test(Analyzer::shared(), &corpus)?;

    println!(
        "Passed {}/{} ({:.1}% accuracy, mean confidence {:.2})",
        report.passed,
        report.total,
        report.accuracy * 100.0,
        report.mean_confidence
    );
    for failure in &report.failures {
        println!(
            "  #{} {:?}: expected {:?}, got {:?}",
            failure.index, failure.title, failure.expected, failure.actual
        );
    }

    if report.accuracy < min_accuracy {
        anyhow::bail!(
            "accuracy {:.2} is below the required {:.2}",
            report.accuracy,
            min_accuracy
        );
    }
    Ok(())
}

async fn quota(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let client = RateLimitedClient::new(config.build_api()?, config.client.clone())?;
    let probe = client.probe().await?;

    println!("Limit:         {}", probe.state.limit());
    println!("Remaining:     {}", probe.state.remaining());
    println!("Resets at:     {}", probe.state.reset_at().to_rfc3339());
    println!("Latency:       {} ms", probe.latency.as_millis());
    println!("Within buffer: {}", probe.within_buffer);
    Ok(())
}

fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    MonitorConfig::default().save(output)?;
    println!("Config written to {}", output.display());
    println!("Set dry_run to false and fill in the provider section to label real issues.");
    Ok(())
}
