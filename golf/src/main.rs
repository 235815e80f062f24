//! Wikipedia-golf automation CLI.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use golf::evaluation::{evaluate_books, generate_pairs, summarize_evaluation_results};
use golf::experiment::run_experiment;
use golf::io::run_log::write_json;
use golf::io::wiki::HttpWikiClient;
use golf::logging;

#[derive(Parser)]
#[command(
    name = "golf",
    version,
    about = "Self-revising agent player for Wikipedia golf"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the play-and-revise experiment loop.
    Run {
        /// Directory containing config.toml; books and logs are written here.
        experiment_dir: PathBuf,
    },
    /// Evaluate saved books against the fixed pair dataset.
    Evaluate {
        experiment_dir: PathBuf,
    },
    /// Print per-book success rates aggregated from evaluation records.
    Summarize {
        experiment_dir: PathBuf,
    },
    /// Generate a random evaluation-pair dataset.
    Pairs {
        /// Number of start/goal pairs to draw.
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Output JSON file.
        #[arg(long, default_value = "evaluation_pairs.json")]
        output: PathBuf,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { experiment_dir } => run_experiment(&experiment_dir),
        Command::Evaluate { experiment_dir } => evaluate_books(&experiment_dir),
        Command::Summarize { experiment_dir } => {
            let stats = summarize_evaluation_results(&experiment_dir)?;
            if stats.is_empty() {
                println!("no evaluation records found");
                return Ok(());
            }
            for entry in stats {
                println!(
                    "book {:>3}: {}/{} succeeded ({:.1}%)",
                    entry.book_index,
                    entry.success_count,
                    entry.total_runs,
                    entry.success_rate * 100.0
                );
            }
            Ok(())
        }
        Command::Pairs { count, output } => {
            let wiki = HttpWikiClient::new()?;
            let pairs = generate_pairs(&wiki, count).context("generate evaluation pairs")?;
            write_json(&output, &pairs)?;
            println!("wrote {} pairs to {}", pairs.len(), output.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["golf", "run", "experiments/demo"]);
        assert!(matches!(cli.command, Command::Run { .. }));
    }

    #[test]
    fn parse_pairs_defaults() {
        let cli = Cli::parse_from(["golf", "pairs"]);
        match cli.command {
            Command::Pairs { count, output } => {
                assert_eq!(count, 10);
                assert_eq!(output, PathBuf::from("evaluation_pairs.json"));
            }
            _ => panic!("expected pairs command"),
        }
    }

    #[test]
    fn parse_pairs_with_flags() {
        let cli = Cli::parse_from(["golf", "pairs", "--count", "3", "--output", "out.json"]);
        match cli.command {
            Command::Pairs { count, output } => {
                assert_eq!(count, 3);
                assert_eq!(output, PathBuf::from("out.json"));
            }
            _ => panic!("expected pairs command"),
        }
    }
}
