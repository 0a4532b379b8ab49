//! bibharvest - arXiv & Google Scholar BibTeX harvester
//!
//! Queries one of two academic search providers for papers matching a
//! keyword query, fetches each result's BibTeX record, and writes them all
//! to one output file. The collected records are saved on every exit path:
//! normal completion, a fatal pipeline error, and Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! bibharvest arxiv "(dark pattern OR dark patterns) AND experiment*"
//! bibharvest scholar '"dark pattern" AND (experiment*)' --pages 1-3 --ylo 2010 --yhi 2025
//! ```

use anyhow::{Context, Result};
use bibharvest::arxiv::{self, ArxivConfig};
use bibharvest::collector::{self, Collector};
use bibharvest::query::{ArxivQuery, ScholarQuery, DEFAULT_ARXIV_URL, DEFAULT_SCHOLAR_URL};
use bibharvest::scholar::{self, ScholarConfig};
use bibharvest::HarvestError;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// arXiv & Google Scholar BibTeX harvesting pipeline
#[derive(Parser)]
#[command(name = "bibharvest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest BibTeX records from an arXiv search
    Arxiv {
        /// Free-text boolean search query
        query: String,

        /// Field scope for the search
        #[arg(long, default_value = "all")]
        searchtype: String,

        /// Whether result abstracts are rendered ("show" / "hide")
        #[arg(long, default_value = "show")]
        abstracts: String,

        /// Results per page
        #[arg(long, default_value = "200")]
        size: u32,

        /// Sort order (empty = relevance)
        #[arg(long, default_value = "")]
        order: String,

        /// Search endpoint base URL
        #[arg(long, default_value = DEFAULT_ARXIV_URL)]
        base_url: String,

        /// External citation lookup tool
        #[arg(long, default_value = "arxiv2bib")]
        tool: String,

        /// HTTP request timeout in seconds
        #[arg(long, default_value = "30")]
        http_timeout: u64,

        /// Citation tool timeout in seconds
        #[arg(long, default_value = "30")]
        tool_timeout: u64,

        /// Politeness delay after each lookup, in milliseconds
        #[arg(long, default_value = "1000")]
        delay_ms: u64,

        /// Output file
        #[arg(short, long, default_value = "arxiv_bibtex.bib")]
        output: PathBuf,
    },

    /// Harvest BibTeX records from a Google Scholar search
    Scholar {
        /// Free-text boolean search query
        query: String,

        /// Page range to harvest (e.g. "1", "1-3")
        #[arg(long, default_value = "1")]
        pages: String,

        /// Year lower bound
        #[arg(long, default_value = "2010")]
        ylo: i32,

        /// Year upper bound
        #[arg(long, default_value = "2025")]
        yhi: i32,

        /// Source data type filter
        #[arg(long, default_value = "0,14")]
        sdt: String,

        /// Scholar base URL (mirror sites)
        #[arg(long, default_value = DEFAULT_SCHOLAR_URL)]
        base_url: String,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Delay between UI actions, in milliseconds
        #[arg(long, default_value = "1000")]
        action_delay_ms: u64,

        /// Deadline for the first page's results to render, in seconds
        #[arg(long, default_value = "30")]
        first_page_timeout: u64,

        /// Deadline for subsequent pages' results to render, in seconds
        #[arg(long, default_value = "20")]
        page_timeout: u64,

        /// Deadline for citation panel elements to appear, in seconds
        #[arg(long, default_value = "10")]
        element_timeout: u64,

        /// Output file (default: bibtex_<timestamp>_pages_<range>.bib)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Arxiv {
            query,
            searchtype,
            abstracts,
            size,
            order,
            base_url,
            tool,
            http_timeout,
            tool_timeout,
            delay_ms,
            output,
        } => {
            let cfg = ArxivConfig {
                base_url,
                query: ArxivQuery {
                    query,
                    searchtype,
                    abstracts,
                    size,
                    order,
                },
                bibtex_tool: tool,
                http_timeout_secs: http_timeout,
                tool_timeout_secs: tool_timeout,
                politeness_delay_ms: delay_ms,
            };
            run_arxiv(cfg, output).await
        }
        Commands::Scholar {
            query,
            pages,
            ylo,
            yhi,
            sdt,
            base_url,
            headless,
            action_delay_ms,
            first_page_timeout,
            page_timeout,
            element_timeout,
            output,
        } => {
            let (page_start, page_end) = parse_pages(&pages).context("Invalid --pages format")?;
            let cfg = ScholarConfig {
                base_url,
                query: ScholarQuery {
                    query,
                    sdt,
                    ylo,
                    yhi,
                },
                page_start,
                page_end,
                headless,
                action_delay_ms,
                first_page_timeout_secs: first_page_timeout,
                page_timeout_secs: page_timeout,
                element_timeout_secs: element_timeout,
            };
            let output = output.unwrap_or_else(|| {
                PathBuf::from(collector::scholar_filename(page_start, page_end))
            });
            run_scholar(cfg, output).await
        }
    }
}

// ============================================================================
// Pipeline Drivers
// ============================================================================

async fn run_arxiv(cfg: ArxivConfig, output: PathBuf) -> Result<()> {
    let collector = Arc::new(Mutex::new(Collector::new()));

    let outcome = tokio::select! {
        res = arxiv::run(&cfg, &collector) => res,
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted. Saving collected BibTeX entries...");
            Ok(())
        }
    };

    finalize(&collector, &output, outcome)
}

async fn run_scholar(cfg: ScholarConfig, output: PathBuf) -> Result<()> {
    let collector = Arc::new(Mutex::new(Collector::new()));

    // The browser session is synchronous end to end. It runs on a detached
    // thread rather than the blocking pool: runtime shutdown joins blocking
    // tasks, which would hold the process hostage to the remaining pages
    // after an interrupt. A detached thread dies with the process, so the
    // interrupt path saves what was collected and exits immediately.
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    {
        let cfg = cfg.clone();
        let collector = Arc::clone(&collector);
        std::thread::spawn(move || {
            let _ = done_tx.send(scholar::run(&cfg, &collector));
        });
    }

    let outcome = tokio::select! {
        res = done_rx => res.unwrap_or_else(|_| {
            Err(HarvestError::Browser("Scholar worker panicked".to_string()))
        }),
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted. Saving collected BibTeX entries...");
            Ok(())
        }
    };

    finalize(&collector, &output, outcome)
}

/// The one finalization point for every exit path: write whatever was
/// collected, then surface the pipeline outcome.
fn finalize(
    collector: &Mutex<Collector>,
    output: &Path,
    outcome: bibharvest::Result<()>,
) -> Result<()> {
    let wrote = collector::lock(collector)
        .save(output)
        .context("Failed to save collected BibTeX entries")?;
    if wrote {
        info!(output = %output.display(), "Done");
    }
    outcome?;
    Ok(())
}

/// Parse a page range string (e.g. "1", "1-10") into (start, end).
fn parse_pages(pages_str: &str) -> Result<(u32, u32)> {
    if let Some((start, end)) = pages_str.split_once('-') {
        let start: u32 = start.trim().parse().context("Invalid start page")?;
        let end: u32 = end.trim().parse().context("Invalid end page")?;
        if start == 0 || end < start {
            anyhow::bail!("Page range must be ascending and 1-indexed");
        }
        Ok((start, end))
    } else {
        let page: u32 = pages_str.trim().parse().context("Invalid page number")?;
        if page == 0 {
            anyhow::bail!("Pages are 1-indexed");
        }
        Ok((page, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pages_single() {
        assert_eq!(parse_pages("3").expect("parse failed"), (3, 3));
    }

    #[test]
    fn test_parse_pages_range() {
        assert_eq!(parse_pages("1-10").expect("parse failed"), (1, 10));
    }

    #[test]
    fn test_parse_pages_rejects_descending() {
        assert!(parse_pages("5-2").is_err());
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("x").is_err());
    }

    #[test]
    fn test_interrupt_shutdown_not_blocked_by_worker() {
        use std::time::{Duration, Instant};

        let start = Instant::now();
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            // Same worker mechanism as run_scholar: a detached thread
            // reporting through a oneshot channel, raced against an
            // interrupt. The interrupt wins here.
            let (done_tx, done_rx) = tokio::sync::oneshot::channel();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_secs(5));
                let _ = done_tx.send(());
            });
            tokio::select! {
                _ = done_rx => {}
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        });
        // Dropping the runtime is where the process exits after the
        // interrupt-path save; it must not wait out the worker.
        drop(rt);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
