//! Accumulation and finalization of collected citation records.
//!
//! One [`Collector`] value owns everything a run produces: the BibTeX texts
//! in acquisition order plus the per-item good/bad tallies. It is threaded
//! through whichever provider pipeline is active and finalized exactly once
//! from `main`, so the same save path covers normal completion, pipeline
//! errors, and user interrupts.

use crate::error::Result;
use chrono::Local;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// One per-item outcome, identified by its `page/index` slot and title.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// Position token, e.g. "2/7" for page 2, item 7
    pub slot: String,
    /// Paper title (or whatever title text was recoverable)
    pub title: String,
}

/// In-memory accumulator for one run.
///
/// Records are kept in the order they were obtained (page order, then
/// within-page extraction order); no reordering or dedup is performed.
#[derive(Debug, Default)]
pub struct Collector {
    records: Vec<String>,
    good: Vec<Outcome>,
    bad: Vec<Outcome>,
}

/// Summary written next to the output file as JSON.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    records: usize,
    good: &'a [Outcome],
    bad: &'a [Outcome],
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully fetched citation.
    pub fn push_record(&mut self, slot: &str, title: &str, bibtex: String) {
        self.records.push(bibtex);
        self.good.push(Outcome {
            slot: slot.to_string(),
            title: title.to_string(),
        });
    }

    /// Record one failed item (extraction or citation fetch).
    pub fn push_failure(&mut self, slot: &str, title: &str) {
        self.bad.push(Outcome {
            slot: slot.to_string(),
            title: title.to_string(),
        });
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn good(&self) -> &[Outcome] {
        &self.good
    }

    pub fn bad(&self) -> &[Outcome] {
        &self.bad
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Join all accumulated citation texts with a blank line between entries.
    pub fn format_entries(&self) -> String {
        self.records.join("\n\n")
    }

    /// Write the accumulated records to `path` as UTF-8, plus a JSON run
    /// report next to it. Skips both files when nothing was collected.
    ///
    /// Returns `true` if the output file was written.
    pub fn save(&self, path: &Path) -> Result<bool> {
        if self.is_empty() {
            println!("No BibTeX entries to save.");
            return Ok(false);
        }

        std::fs::write(path, self.format_entries())?;
        println!(
            "Saved {} BibTeX entries to {}",
            self.records.len(),
            path.display()
        );

        let report = RunReport {
            records: self.records.len(),
            good: &self.good,
            bad: &self.bad,
        };
        let report_path = path.with_extension("report.json");
        std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
        info!(
            good = self.good.len(),
            bad = self.bad.len(),
            report = %report_path.display(),
            "Run report written"
        );

        Ok(true)
    }
}

/// Lock the shared collector, recovering the data from a poisoned lock.
///
/// The collector is only ever touched from one logical thread of control at
/// a time; the mutex exists so the interrupt path in `main` can finalize
/// while the detached browser worker thread is still winding down.
pub fn lock(collector: &Mutex<Collector>) -> MutexGuard<'_, Collector> {
    collector.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generate the Scholar output filename, embedding the capture timestamp
/// and the page range processed.
pub fn scholar_filename(page_start: u32, page_end: u32) -> String {
    let now = Local::now().format("%Y-%m-%d_%H-%M-%S");
    format!("bibtex_{}_pages_{}-{}.bib", now, page_start, page_end)
}
