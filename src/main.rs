use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use kb_index::commands::{build, run_query, stats, validate};
use kb_index::query::SearchFilters;
use kb_index::template::TemplateKind;

#[derive(Parser)]
#[command(name = "kb-index")]
#[command(about = "Integrity checker and search index builder for markdown knowledge bases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the search index and write the snapshot
    Build {
        /// Corpus root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Re-parse only files whose content changed since the last build
        #[arg(long)]
        incremental: bool,
        /// Write the snapshot here instead of the configured file name
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check corpus integrity without writing an index
    Validate {
        /// Corpus root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Search the built index
    Query {
        /// Query text
        text: String,
        /// Only return documents in this category
        #[arg(long)]
        category: Option<String>,
        /// Only return documents carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Only return documents of this template kind, e.g. "pr-notes"
        #[arg(long)]
        kind: Option<TemplateKind>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Corpus root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Show statistics about the built index
    Stats {
        /// Corpus root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", style("error:").red().bold());
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Build {
            root,
            incremental,
            output,
        } => {
            let summary = build(&root, incremental, output)?;
            Ok(ExitCode::from(summary.exit_code()))
        }
        Commands::Validate { root } => {
            let summary = validate(&root)?;
            Ok(ExitCode::from(summary.exit_code()))
        }
        Commands::Query {
            text,
            category,
            tag,
            kind,
            limit,
            json,
            root,
        } => {
            let filters = SearchFilters {
                category,
                tag,
                template_kind: kind,
            };
            run_query(&root, &text, &filters, limit, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats { root } => {
            stats(&root)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
