// LogGuard CLI - access log anomaly detection

use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressStyle};
use logguard_core::{load_records, write_records, SyntheticTraffic, TrafficGenerator};
use logguard_pipeline::config::{load_or_default, parse_assignments, DEFAULT_CONFIG_PATH};
use logguard_pipeline::{
    load_results, result_view, HistoryQuery, PipelineConfig, PipelineRunner, RunHistory,
    SortKey, SortOrder,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logguard")]
#[command(version = "0.1.0")]
#[command(about = "Access log anomaly detection with a reconstruction model", long_about = None)]
struct Cli {
    /// Config file (created with defaults when missing)
    #[arg(short, long, env = "LOGGUARD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level filter, RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once
    Run {
        /// Use the existing data file instead of generating traffic
        #[arg(long)]
        no_generate: bool,

        /// Skip writing result.json
        #[arg(long)]
        no_export: bool,

        /// Override the data file for this run
        #[arg(long)]
        data_path: Option<PathBuf>,
    },

    /// Write synthetic access logs
    Simulate {
        #[arg(short, long, default_value = "5000")]
        rows: usize,

        /// Seed for a reproducible batch
        #[arg(short, long)]
        seed: Option<u64>,

        /// Share of abnormal requests
        #[arg(short, long, default_value = "0.1")]
        abnormal_ratio: f64,

        /// Output CSV (default: configured data_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show past runs
    History {
        /// Only successful (true) or failed (false) runs
        #[arg(long)]
        success: Option<bool>,

        /// timestamp, anomalies_count or total_samples
        #[arg(long, default_value = "timestamp")]
        sort_by: SortKey,

        #[arg(long, default_value = "desc")]
        order: SortOrder,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        per_page: usize,
    },

    /// Show counts of the most recent successful run
    Stats,

    /// Show flagged records of the last exported run
    Results {
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Include normal records
        #[arg(long)]
        all: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show or update the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Update keys, e.g. `threshold=2.0 notification.enabled=true`
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_or_default(&cli.config)?;
    debug!(path = %cli.config.display(), "Config loaded");

    match cli.command {
        Commands::Run {
            no_generate,
            no_export,
            data_path,
        } => {
            let mut overrides = toml::Table::new();
            if no_generate {
                overrides.insert("generate_synthetic".into(), toml::Value::Boolean(false));
            }
            if no_export {
                overrides.insert("export_results".into(), toml::Value::Boolean(false));
            }
            if let Some(path) = data_path {
                overrides.insert(
                    "data_path".into(),
                    toml::Value::String(path.to_string_lossy().into_owned()),
                );
            }
            let config = config.apply_update(&overrides)?;

            if !run_pipeline(config).await? {
                std::process::exit(1);
            }
        }
        Commands::Simulate {
            rows,
            seed,
            abnormal_ratio,
            output,
        } => {
            let output = output.unwrap_or_else(|| config.data_path.clone());
            simulate(rows, seed, abnormal_ratio, &output)?;
        }
        Commands::History {
            success,
            sort_by,
            order,
            page,
            per_page,
        } => {
            let query = HistoryQuery {
                success,
                sort_by,
                order,
                page,
                per_page,
            };
            show_history(&config, &query)?;
        }
        Commands::Stats => {
            show_stats(&config)?;
        }
        Commands::Results { limit, all, json } => {
            show_results(&config, limit, all, json)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{} {}", "Config:".dimmed(), cli.config.display());
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Set { assignments } => {
                let updated = config.apply_update(&parse_assignments(&assignments)?)?;
                updated.save(&cli.config)?;
                println!(
                    "{} Updated {} ({} key(s))",
                    "✓".green().bold(),
                    cli.config.display(),
                    assignments.len()
                );
            }
        },
    }

    Ok(())
}

// returns whether the run succeeded
async fn run_pipeline(config: PipelineConfig) -> Result<bool, Box<dyn std::error::Error>> {
    println!("\n{}", "🛡  LogGuard pipeline".cyan().bold());
    println!("{}", "─".repeat(50).dimmed());
    println!("{} {}", "Data:".dimmed(), config.data_path.display());
    println!("{} {}", "Threshold:".dimmed(), config.threshold.to_string().yellow());
    println!("{} {}", "Epochs:".dimmed(), config.epochs);

    let runner = PipelineRunner::new(config);
    let handle = runner.start()?;
    let run_id = handle.run_id;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            _ = ticker.tick() => {
                let state = runner.status();
                pb.set_position(state.progress as u64);
                pb.set_message(state.message);
            }
            _ = tokio::signal::ctrl_c() => {
                if runner.request_stop().is_ok() {
                    pb.set_message("stopping...");
                }
            }
        }
    };

    let state = runner.status();
    println!("{}", "─".repeat(50).dimmed());
    println!("{} {}", "Run:".dimmed(), run_id.to_string().dimmed());

    match outcome {
        Ok(summary) => {
            pb.set_position(100);
            pb.finish_with_message("done");
            println!("\n{}", "Results:".green().bold());
            println!("  {} {}", "Samples:".dimmed(), summary.total_samples);
            println!(
                "  {} {} ({:.2}%)",
                "Anomalies:".dimmed(),
                summary.anomalies_count.to_string().red().bold(),
                summary.anomaly_rate
            );
            if let Some(loss) = summary.training.final_loss {
                println!("  {} {:.6}", "Final loss:".dimmed(), loss);
            }
            if let Some(path) = &summary.result_path {
                println!("  {} {}", "Exported:".dimmed(), path.display());
            }
            if let Some(runtime) = state.runtime(chrono::Utc::now()) {
                println!("  {} {}ms", "Time:".dimmed(), runtime.num_milliseconds());
            }
            Ok(true)
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            println!("\n{} {}", "✗ Run failed:".red().bold(), e);
            Ok(false)
        }
    }
}

fn simulate(
    rows: usize,
    seed: Option<u64>,
    abnormal_ratio: f64,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut generator = SyntheticTraffic::new(rows).with_abnormal_ratio(abnormal_ratio);
    if let Some(seed) = seed {
        generator = generator.with_seed(seed);
    }

    let records = generator.generate()?;
    write_records(output, &records)?;

    let errors = records.iter().filter(|r| r.is_error()).count();
    println!(
        "{} Wrote {} records to {} ({} error responses)",
        "✓".green().bold(),
        records.len().to_string().yellow(),
        output.display(),
        errors
    );
    Ok(())
}

fn show_history(
    config: &PipelineConfig,
    query: &HistoryQuery,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = RunHistory::new(&config.history_path).query(query)?;

    println!("\n{}", "📋 Run History".cyan().bold());
    if page.records.is_empty() {
        println!("{}", "No runs recorded.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Time", "Status", "Anomalies", "Samples", "Rate"]);

    for r in &page.records {
        let status = if r.success {
            "ok".green().to_string()
        } else {
            "failed".red().to_string()
        };
        table.add_row(vec![
            r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            status,
            r.anomalies_count.to_string(),
            r.total_samples.to_string(),
            format!("{:.2}%", r.anomaly_rate),
        ]);
    }

    println!("{table}");
    println!(
        "{} {}/{} ({} runs)",
        "Page:".dimmed(),
        page.page,
        page.total_pages.max(1),
        page.total
    );
    Ok(())
}

fn show_stats(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{}", "📊 Latest Run".cyan().bold());
    let Some(latest) = RunHistory::new(&config.history_path).latest_success()? else {
        println!("{}", "No successful runs yet.".yellow());
        return Ok(());
    };

    println!(
        "  {} {}",
        "Time:".dimmed(),
        latest.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  {} {}", "Samples:".dimmed(), latest.total_samples);
    println!(
        "  {} {} ({:.2}%)",
        "Anomalies:".dimmed(),
        latest.anomalies_count.to_string().red().bold(),
        latest.anomaly_rate
    );
    Ok(())
}

fn show_results(
    config: &PipelineConfig,
    limit: usize,
    all: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = load_results(config.result_path())?;
    let records = load_records(&config.data_path)?;
    let rows: Vec<_> = result_view(&records, &artifact)?
        .into_iter()
        .filter(|r| all || r.is_anomaly)
        .take(limit)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "\n{} {} of {} flagged",
        "🔍 Results:".cyan().bold(),
        artifact.anomaly_count().to_string().red(),
        artifact.anomalies.len()
    );
    if rows.is_empty() {
        println!("{}", "Nothing to show.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Time", "Endpoint", "Duration", "Loss", "Anomaly"]);
    for r in &rows {
        let flag = if r.is_anomaly {
            "yes".red().bold().to_string()
        } else {
            "no".dimmed().to_string()
        };
        table.add_row(vec![
            r.id.to_string(),
            r.timestamp.format("%H:%M:%S").to_string(),
            r.endpoint.clone(),
            format!("{:.2}s", r.duration),
            format!("{:.4}", r.loss),
            flag,
        ]);
    }
    println!("{table}");
    Ok(())
}
