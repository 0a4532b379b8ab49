//! Google Scholar harvesting pipeline.
//!
//! Drives a persistent headless Chrome session through the Scholar results
//! pages. Each result's BibTeX record is obtained by walking the citation
//! UI: open the cite panel, follow the BibTeX link, read the rendered text,
//! navigate back, close the panel. Any failure inside that sequence tallies
//! the item as bad and the run moves on to the next result.
//!
//! Instead of the fixed page-load sleeps the UI flow was originally
//! calibrated with, readiness is detected by polling for the first result
//! block with a bounded deadline.

use crate::collector::{self, Collector};
use crate::error::{HarvestError, Result};
use crate::query::ScholarQuery;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// CSS anchor for one result block
const RESULT_SELECTOR: &str = "div.gs_ri";
/// Title link inside a result block
const TITLE_SELECTOR: &str = "h3.gs_rt a";
/// "Cite" button inside a result block
const CITE_SELECTOR: &str = "a.gs_or_cit";
/// First format link in the citation panel (BibTeX)
const BIBTEX_LINK_SELECTOR: &str = "#gs_citi a";
/// Rendered citation text element
const CITATION_TEXT_SELECTOR: &str = "pre";
/// Close button of the citation panel
const CLOSE_SELECTOR: &str = "#gs_cit-x";

/// Configuration for one Scholar run
#[derive(Debug, Clone)]
pub struct ScholarConfig {
    /// Scholar base URL
    pub base_url: String,
    /// Search parameters
    pub query: ScholarQuery,
    /// First results page to harvest (1-indexed, inclusive)
    pub page_start: u32,
    /// Last results page to harvest (inclusive)
    pub page_end: u32,
    /// Run Chrome headless
    pub headless: bool,
    /// Delay between consecutive UI actions, in milliseconds
    pub action_delay_ms: u64,
    /// Deadline for the first page's results to render, in seconds
    pub first_page_timeout_secs: u64,
    /// Deadline for subsequent pages' results to render, in seconds
    pub page_timeout_secs: u64,
    /// Deadline for individual panel elements to appear, in seconds
    pub element_timeout_secs: u64,
}

/// Run the Scholar pipeline, accumulating records into `collector`.
///
/// Blocking; the browser session and every UI action are synchronous. A
/// page that fails to render is logged and skipped, a CAPTCHA aborts the
/// run (whatever was already collected is still saved by the caller).
pub fn run(cfg: &ScholarConfig, collector: &Arc<Mutex<Collector>>) -> Result<()> {
    info!(
        query = %cfg.query.query,
        pages = format!("{}-{}", cfg.page_start, cfg.page_end),
        "Starting Google Scholar query"
    );

    let browser = launch_browser(cfg.headless)?;
    let tab = browser.new_tab().map_err(browser_err)?;
    tab.set_default_timeout(Duration::from_secs(cfg.element_timeout_secs));

    for page in cfg.page_start..=cfg.page_end {
        match harvest_page(&tab, cfg, page, page == cfg.page_start, collector) {
            Ok(()) => {}
            Err(HarvestError::Captcha) => return Err(HarvestError::Captcha),
            Err(e) => {
                error!(page, error = %e, "Failed to harvest page");
            }
        }
    }

    let tally = collector::lock(collector);
    info!(
        good = tally.good().len(),
        bad = tally.bad().len(),
        "Scholar run complete"
    );
    Ok(())
}

/// Launch Chrome with the anti-automation flags the Scholar flow needs.
fn launch_browser(headless: bool) -> Result<Browser> {
    let options = LaunchOptions::default_builder()
        .headless(headless)
        .args(vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
        ])
        .build()
        .map_err(|e| HarvestError::Browser(e.to_string()))?;

    Browser::new(options).map_err(browser_err)
}

/// Harvest one results page: navigate, wait for result blocks, then walk
/// every result's citation sequence.
fn harvest_page(
    tab: &Tab,
    cfg: &ScholarConfig,
    page: u32,
    first_page: bool,
    collector: &Mutex<Collector>,
) -> Result<()> {
    let url = cfg.query.to_url(&cfg.base_url, page)?;
    println!("Currently extracting page {}\n", page);
    debug!(page, url = %url, "Navigating");

    tab.navigate_to(url.as_str()).map_err(browser_err)?;
    tab.wait_until_navigated().map_err(browser_err)?;

    // The first page of a run gets a longer deadline; Scholar front-loads
    // consent and bot checks there.
    let deadline = if first_page {
        cfg.first_page_timeout_secs
    } else {
        cfg.page_timeout_secs
    };

    if tab
        .wait_for_element_with_custom_timeout(RESULT_SELECTOR, Duration::from_secs(deadline))
        .is_err()
    {
        let html = tab.get_content().map_err(browser_err)?;
        if is_captcha(&html) {
            warn!(page, "CAPTCHA detected");
            return Err(HarvestError::Captcha);
        }
        return Err(HarvestError::Timeout(
            deadline,
            format!("results on page {}", page),
        ));
    }

    let count = tab.find_elements(RESULT_SELECTOR).map_err(browser_err)?.len();
    info!(page, count, "Result blocks located");

    let delay = Duration::from_millis(cfg.action_delay_ms);
    for idx in 0..count {
        let slot = format!("{}/{}", page, idx + 1);
        // Re-locate the block each iteration; the citation flow navigates
        // away and back, which invalidates earlier element handles.
        let title = article_title(tab, idx).unwrap_or_else(|_| "Title not found".to_string());

        match fetch_citation(tab, idx, delay) {
            Ok(bibtex) => {
                println!(
                    "Successfully downloaded bibtex for {} in page {}, number {}",
                    title,
                    page,
                    idx + 1
                );
                collector::lock(collector).push_record(&slot, &title, bibtex);
            }
            Err(e) => {
                error!(slot = %slot, title = %title, error = %e, "Citation sequence failed");
                collector::lock(collector).push_failure(&slot, &title);
            }
        }
    }

    Ok(())
}

/// Title text of the idx-th result block, from a fresh element handle.
fn article_title(tab: &Tab, idx: usize) -> Result<String> {
    let article = nth_article(tab, idx)?;
    let link = article.find_element(TITLE_SELECTOR).map_err(browser_err)?;
    let title = link.get_inner_text().map_err(browser_err)?;
    Ok(title.trim().to_string())
}

fn nth_article(tab: &Tab, idx: usize) -> Result<Element<'_>> {
    let mut articles = tab.find_elements(RESULT_SELECTOR).map_err(browser_err)?;
    if idx >= articles.len() {
        return Err(HarvestError::Parse(format!(
            "result block {} disappeared from page",
            idx + 1
        )));
    }
    Ok(articles.swap_remove(idx))
}

/// Fetch the BibTeX record for one result block via the citation UI.
///
/// The per-item sequence is: open the cite panel, follow the BibTeX link,
/// read the rendered text, navigate the browser back, close the panel. A
/// failure at any step aborts the rest of the sequence for this item; there
/// is no partial-state rollback beyond the back-navigation already issued.
fn fetch_citation(tab: &Tab, idx: usize, delay: Duration) -> Result<String> {
    // Open the citation panel
    let article = nth_article(tab, idx)?;
    let cite_button = article.find_element(CITE_SELECTOR).map_err(browser_err)?;
    cite_button.click().map_err(browser_err)?;
    std::thread::sleep(delay);

    // Follow the BibTeX format link
    let bibtex_link = tab
        .wait_for_element(BIBTEX_LINK_SELECTOR)
        .map_err(browser_err)?;
    bibtex_link.click().map_err(browser_err)?;
    std::thread::sleep(delay);

    // Read the rendered citation text
    let pre = tab
        .wait_for_element(CITATION_TEXT_SELECTOR)
        .map_err(browser_err)?;
    let bibtex = pre.get_inner_text().map_err(browser_err)?;
    std::thread::sleep(delay);

    // Back to the results page
    tab.evaluate("window.history.go(-1)", false)
        .map_err(browser_err)?;
    std::thread::sleep(delay);

    // Dismiss the citation panel
    let close_button = tab.wait_for_element(CLOSE_SELECTOR).map_err(browser_err)?;
    close_button.click().map_err(browser_err)?;
    std::thread::sleep(delay);

    Ok(bibtex.trim().to_string())
}

/// Whether a rendered page is Scholar's bot-check interstitial.
pub fn is_captcha(html: &str) -> bool {
    html.contains("Solving the above CAPTCHA") || html.contains("unusual traffic")
}

fn browser_err(e: anyhow::Error) -> HarvestError {
    HarvestError::Browser(e.to_string())
}
