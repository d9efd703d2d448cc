//! Shop Insights Command Line Interface
//!
//! Ask questions against a JSON fixture, list the tool catalog, and
//! summarise an audit log.
//!
//! # Usage
//!
//! ```bash
//! # Ask a question as shop 10
//! insights_cli ask --tenant 10 "How many orders do I have?"
//!
//! # Several questions, sharing one cache
//! insights_cli ask --tenant 10 "total sales by month" "top 5 customers by spending"
//!
//! # List tools and their parameters
//! insights_cli tools --verbose
//!
//! # Summarise the audit log
//! insights_cli report --path query_logs/audit.jsonl
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use shop_insights::{
    Answer, AuditReport, InMemoryStore, InsightService, InsightsConfig, Outcome, Question,
    ToolRegistry,
};

#[derive(Parser)]
#[command(name = "insights_cli")]
#[command(version = "0.1.0")]
#[command(about = "Ask natural-language analytics questions about a shop")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one or more questions
    Ask {
        /// Shop the questions belong to
        #[arg(long, short = 't', env = "INSIGHTS_TENANT")]
        tenant: String,

        /// JSON fixture with one array per collection
        #[arg(long, short = 'f', default_value = "data/sample_shop.json")]
        fixture: PathBuf,

        /// Give up on a question after this many milliseconds
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Show tool, confidence and timing for each answer
        #[arg(long, short = 'v')]
        verbose: bool,

        #[arg(required = true)]
        questions: Vec<String>,
    },

    /// List available tools and their parameters
    Tools {
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Summarise an audit log
    Report {
        /// Audit log path (defaults to INSIGHTS_AUDIT_PATH)
        #[arg(long, short = 'p')]
        path: Option<PathBuf>,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask {
            tenant,
            fixture,
            budget_ms,
            verbose,
            questions,
        } => {
            cmd_ask(
                &tenant,
                fixture,
                budget_ms.map(Duration::from_millis),
                verbose,
                &questions,
                cli.format,
            )
            .await
        }
        Commands::Tools { verbose } => cmd_tools(verbose, cli.format),
        Commands::Report { path } => cmd_report(path, cli.format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.format == OutputFormat::Json {
                println!("{}", json!({ "error": format!("{e:#}") }));
            } else {
                eprintln!("{}: {:#}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn cmd_ask(
    tenant: &str,
    fixture: PathBuf,
    budget: Option<Duration>,
    verbose: bool,
    questions: &[String],
    format: OutputFormat,
) -> Result<()> {
    let config = InsightsConfig::from_env().context("invalid configuration")?;
    let store = InMemoryStore::from_fixture(&fixture)
        .with_context(|| format!("loading {}", fixture.display()))?;
    let service = InsightService::builder(Arc::new(store))
        .config(config)
        .build()
        .context("building insight service")?;

    for text in questions {
        let question = Question::new(tenant, text.as_str());
        let answer = match budget {
            Some(budget) => service.answer_within(&question, budget).await,
            None => service.answer(&question).await,
        };
        print_answer(text, &answer, verbose, format);
    }

    service.audit().shutdown().await;
    Ok(())
}

fn print_answer(question: &str, answer: &Answer, verbose: bool, format: OutputFormat) {
    if format == OutputFormat::Json {
        let value = json!({
            "question": question,
            "answer": answer.text,
            "outcome": answer.outcome(),
            "tool": answer.tool,
            "confidence": answer.confidence,
            "latency_ms": answer.latency.as_millis() as u64,
            "cache_hit": answer.cache_hit,
            "error": answer.error.as_ref().map(|e| e.to_string()),
            "data": answer.data,
        });
        println!("{value}");
        return;
    }

    let marker = match answer.outcome() {
        Outcome::Success => "OK".green().bold(),
        Outcome::Ambiguous => "??".yellow().bold(),
        _ => "!!".red().bold(),
    };
    println!("{} {}", marker, question.bold());
    println!("   {}", answer.text.replace('\n', "\n   "));
    if verbose {
        let confidence = answer
            .confidence
            .map_or_else(|| "-".to_string(), |c| format!("{c:.2}"));
        println!(
            "   {}",
            format!(
                "tool={} confidence={} latency={}ms cache_hit={}",
                answer.tool.as_deref().unwrap_or("-"),
                confidence,
                answer.latency.as_millis(),
                answer.cache_hit
            )
            .dimmed()
        );
        if let Some(error) = &answer.error {
            println!("   {}", error.to_string().dimmed());
        }
    }
}

fn cmd_tools(verbose: bool, format: OutputFormat) -> Result<()> {
    let registry = ToolRegistry::new();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&registry.list())?);
        return Ok(());
    }

    for spec in registry.list() {
        println!("{:<28} {}", spec.name.cyan().bold(), spec.description);
        if verbose {
            for param in spec.params {
                let required = if param.required { "required" } else { "optional" };
                println!(
                    "    {:<12} {:<8} {}",
                    param.name,
                    required.dimmed(),
                    param.description
                );
            }
        }
    }
    Ok(())
}

fn cmd_report(path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => InsightsConfig::from_env()?.audit.path,
    };
    let report =
        AuditReport::from_path(&path).with_context(|| format!("reading {}", path.display()))?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", format!("Audit report: {}", path.display()).bold());
    println!("  questions:     {}", report.total);
    println!(
        "  success rate:  {:.1}%",
        report.success_rate() * 100.0
    );
    println!("  cache hits:    {}", report.cache_hits);
    println!("  avg latency:   {:.1}ms", report.avg_latency_ms);
    if report.skipped_lines > 0 {
        println!(
            "  {}",
            format!("{} malformed lines skipped", report.skipped_lines).yellow()
        );
    }

    if !report.tools.is_empty() {
        println!("\n{}", "Tools".bold());
        for (tool, count) in report.top_tools() {
            println!("  {tool:<28} {count}");
        }
    }

    if !report.recent_failures.is_empty() {
        println!("\n{}", "Recent failures".bold());
        for entry in &report.recent_failures {
            println!(
                "  [{}] {} {}",
                entry.outcome.to_string().red(),
                entry.question,
                entry.error.as_deref().unwrap_or_default().dimmed()
            );
        }
    }

    if !report.low_confidence.is_empty() {
        println!("\n{}", "Low confidence".bold());
        for entry in &report.low_confidence {
            let confidence = entry
                .confidence
                .map_or_else(|| "-".to_string(), |c| format!("{c:.2}"));
            println!(
                "  {} ({} @ {})",
                entry.question,
                entry.tool.as_deref().unwrap_or("-"),
                confidence
            );
        }
    }
    Ok(())
}
