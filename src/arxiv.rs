//! arXiv harvesting pipeline.
//!
//! Fetches one search-results page over plain HTTP, extracts arXiv
//! identifiers and titles from the result blocks, and shells out to an
//! external lookup tool (`arxiv2bib` by default) for each identifier's
//! BibTeX record. A transport or HTTP failure aborts the whole run; a
//! failed lookup skips that one identifier and the run continues.

use crate::collector::{self, Collector};
use crate::error::{HarvestError, Result};
use crate::query::ArxivQuery;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// One extracted search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// arXiv identifier, e.g. "2301.00001"
    pub identifier: String,
    /// Paper title
    pub title: String,
}

/// Outcome of extracting one result block
#[derive(Debug, Clone)]
pub enum Extraction {
    /// Identifier and title located
    Item(SearchResult),
    /// Identifier token missing or malformed; carries whatever title text
    /// was recoverable for the failure tally
    Failed {
        /// Best-effort title of the unparseable block
        title: String,
    },
}

/// Configuration for one arXiv run
#[derive(Debug, Clone)]
pub struct ArxivConfig {
    /// Search endpoint base URL
    pub base_url: String,
    /// Search parameters
    pub query: ArxivQuery,
    /// External citation lookup tool name
    pub bibtex_tool: String,
    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,
    /// Subprocess timeout in seconds
    pub tool_timeout_secs: u64,
    /// Politeness delay after every lookup attempt, in milliseconds
    pub politeness_delay_ms: u64,
}

/// Run the arXiv pipeline, accumulating records into `collector`.
pub async fn run(cfg: &ArxivConfig, collector: &Mutex<Collector>) -> Result<()> {
    let url = cfg.query.to_url(&cfg.base_url)?;
    info!(query = %cfg.query.query, url = %url, "Starting arXiv query");

    println!("Fetching arXiv search results...");
    let client = build_http_client(cfg.http_timeout_secs)?;
    let html = fetch_results_page(&client, url.as_str()).await?;

    let extractions = extract_results(&html)?;
    let items: Vec<&SearchResult> = extractions
        .iter()
        .filter_map(|e| match e {
            Extraction::Item(item) => Some(item),
            Extraction::Failed { .. } => None,
        })
        .collect();

    println!("\nFound {} papers", items.len());
    println!("\nPapers found:");
    for item in &items {
        println!("{}: {}", item.identifier, item.title);
    }

    println!("\nGetting BibTeX entries...");
    harvest_citations(cfg, &extractions, collector).await;

    let tally = collector::lock(collector);
    info!(
        good = tally.good().len(),
        bad = tally.bad().len(),
        "arXiv run complete"
    );
    Ok(())
}

/// Fetch the citation record for every extracted item, tallying outcomes.
///
/// Slot tokens follow extraction order across all blocks, so a failed
/// block and its successors keep distinct positions in the tally.
async fn harvest_citations(
    cfg: &ArxivConfig,
    extractions: &[Extraction],
    collector: &Mutex<Collector>,
) {
    let total = extractions
        .iter()
        .filter(|e| matches!(e, Extraction::Item(_)))
        .count();
    let mut processed = 0;

    for (idx, extraction) in extractions.iter().enumerate() {
        let slot = format!("1/{}", idx + 1);
        let item = match extraction {
            Extraction::Failed { title } => {
                warn!(slot = %slot, title = %title, "Could not extract identifier");
                collector::lock(collector).push_failure(&slot, title);
                continue;
            }
            Extraction::Item(item) => item,
        };

        processed += 1;
        println!("Processing {}/{}: {}", processed, total, item.identifier);

        match fetch_bibtex(&cfg.bibtex_tool, &item.identifier, cfg.tool_timeout_secs).await {
            Ok(bibtex) => {
                collector::lock(collector).push_record(&slot, &item.title, bibtex);
            }
            Err(e) => {
                error!(id = %item.identifier, error = %e, "BibTeX lookup failed");
                collector::lock(collector).push_failure(&slot, &item.title);
            }
        }

        // Politeness delay with a little jitter, regardless of outcome
        let delay = cfg.politeness_delay_ms + rand::random::<u64>() % 250;
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

/// Build HTTP client with a browser-like user agent and bounded timeout
fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Fetch one search-results page. Any transport error or failure status is
/// fatal for the run.
async fn fetch_results_page(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::Http {
            code: status.as_u16(),
            url: url.to_string(),
        });
    }

    Ok(response.text().await?)
}

/// Parse an arXiv search-results page into per-block extractions, in
/// document order.
///
/// Each result block is a `li.arxiv-result`; the identifier follows the
/// "arXiv:" label inside `p.list-title` and the title sits in the nearest
/// `p.title`.
pub fn extract_results(html: &str) -> Result<Vec<Extraction>> {
    let document = Html::parse_document(html);

    let item_selector = Selector::parse("li.arxiv-result")
        .map_err(|e| HarvestError::Parse(e.to_string()))?;
    let id_selector =
        Selector::parse("p.list-title").map_err(|e| HarvestError::Parse(e.to_string()))?;
    let title_selector =
        Selector::parse("p.title").map_err(|e| HarvestError::Parse(e.to_string()))?;

    // Modern (2301.00001v2) and legacy (hep-th/9901001) identifier shapes
    let id_regex = Regex::new(r"^(\d{4}\.\d{4,5}|[a-z-]+(\.[A-Z]{2})?/\d{7})(v\d+)?$")
        .map_err(|e| HarvestError::Parse(e.to_string()))?;

    let mut extractions = Vec::new();

    for block in document.select(&item_selector) {
        let title = block
            .select(&title_selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_else(|| "Title not found".to_string());

        let label_text = block
            .select(&id_selector)
            .next()
            .map(|e| e.text().collect::<String>())
            .unwrap_or_default();

        let identifier = label_text
            .split("arXiv:")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string);

        match identifier {
            Some(id) if id_regex.is_match(&id) => {
                extractions.push(Extraction::Item(SearchResult {
                    identifier: id,
                    title,
                }));
            }
            Some(id) => {
                debug!(token = %id, "Rejecting malformed identifier token");
                extractions.push(Extraction::Failed { title });
            }
            None => extractions.push(Extraction::Failed { title }),
        }
    }

    Ok(extractions)
}

/// Invoke the external citation lookup tool for one identifier.
///
/// Exit zero means standard output is the citation record, returned
/// verbatim; a nonzero exit or a timeout yields an error and no record.
pub async fn fetch_bibtex(tool: &str, arxiv_id: &str, timeout_secs: u64) -> Result<String> {
    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        tokio::process::Command::new(tool).arg(arxiv_id).output(),
    )
    .await
    .map_err(|_| HarvestError::Timeout(timeout_secs, format!("{} {}", tool, arxiv_id)))??;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(HarvestError::Subprocess {
            id: arxiv_id.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_block(id_line: &str, title: &str) -> String {
        format!(
            r##"<li class="arxiv-result">
                 <p class="list-title is-inline-block"><a href="#">{}</a></p>
                 <p class="title is-5 mathjax">{}</p>
               </li>"##,
            id_line, title
        )
    }

    fn page(blocks: &[String]) -> String {
        format!(
            "<html><body><ol>{}</ol></body></html>",
            blocks.join("\n")
        )
    }

    #[test]
    fn test_extract_preserves_document_order() {
        let html = page(&[
            result_block("arXiv:2301.00001", "First paper"),
            result_block("arXiv:2302.12345v2", "Second paper"),
            result_block("arXiv:hep-th/9901001", "Legacy paper"),
        ]);

        let extractions = extract_results(&html).expect("Parse failed");
        let ids: Vec<&str> = extractions
            .iter()
            .filter_map(|e| match e {
                Extraction::Item(item) => Some(item.identifier.as_str()),
                Extraction::Failed { .. } => None,
            })
            .collect();

        assert_eq!(ids, vec!["2301.00001", "2302.12345v2", "hep-th/9901001"]);
        if let Extraction::Item(first) = &extractions[0] {
            assert_eq!(first.title, "First paper");
        } else {
            panic!("First block should extract");
        }
    }

    #[test]
    fn test_block_without_identifier_becomes_failure() {
        let html = page(&[
            result_block("no label here", "Unlabelled paper"),
            result_block("arXiv:2301.00001", "Good paper"),
        ]);

        let extractions = extract_results(&html).expect("Parse failed");
        assert_eq!(extractions.len(), 2);
        match &extractions[0] {
            Extraction::Failed { title } => assert_eq!(title, "Unlabelled paper"),
            Extraction::Item(_) => panic!("Should not extract without label"),
        }
        assert!(matches!(&extractions[1], Extraction::Item(_)));
    }

    #[test]
    fn test_malformed_identifier_token_becomes_failure() {
        let html = page(&[result_block("arXiv:not-an-id", "Odd paper")]);
        let extractions = extract_results(&html).expect("Parse failed");
        assert!(matches!(&extractions[0], Extraction::Failed { .. }));
    }

    #[test]
    fn test_extract_empty_page() {
        let extractions =
            extract_results("<html><body></body></html>").expect("Parse failed");
        assert!(extractions.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_bibtex_returns_stdout_verbatim() {
        let bibtex = fetch_bibtex("echo", "2301.00001", 5)
            .await
            .expect("echo should succeed");
        assert_eq!(bibtex, "2301.00001\n");
    }

    #[tokio::test]
    async fn test_fetch_bibtex_nonzero_exit() {
        let err = fetch_bibtex("false", "2301.00001", 5)
            .await
            .expect_err("false should fail");
        assert!(matches!(err, HarvestError::Subprocess { .. }));
    }

    #[tokio::test]
    async fn test_fetch_bibtex_missing_tool() {
        let err = fetch_bibtex("definitely-not-a-real-tool", "2301.00001", 5)
            .await
            .expect_err("missing tool should fail");
        assert!(matches!(err, HarvestError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_harvest_two_successes_one_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let tool = dir.path().join("stub2bib");
        std::fs::write(
            &tool,
            "#!/bin/sh\n\
             case \"$1\" in\n\
               2301.00001) printf '@misc{one}';;\n\
               2301.00003) printf '@misc{three}';;\n\
               *) echo 'no such id' >&2; exit 1;;\n\
             esac\n",
        )
        .expect("write stub");
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let cfg = ArxivConfig {
            base_url: crate::query::DEFAULT_ARXIV_URL.to_string(),
            query: ArxivQuery::default(),
            bibtex_tool: tool.to_string_lossy().into_owned(),
            http_timeout_secs: 5,
            tool_timeout_secs: 5,
            politeness_delay_ms: 0,
        };
        let extractions = vec![
            Extraction::Item(SearchResult {
                identifier: "2301.00001".to_string(),
                title: "One".to_string(),
            }),
            Extraction::Item(SearchResult {
                identifier: "2301.00002".to_string(),
                title: "Two".to_string(),
            }),
            Extraction::Item(SearchResult {
                identifier: "2301.00003".to_string(),
                title: "Three".to_string(),
            }),
        ];

        let collector = Mutex::new(Collector::new());
        harvest_citations(&cfg, &extractions, &collector).await;

        let tally = collector::lock(&collector);
        assert_eq!(tally.records().len(), 2);
        assert_eq!(tally.format_entries(), "@misc{one}\n\n@misc{three}");
        assert_eq!(tally.bad().len(), 1);
        assert_eq!(tally.bad()[0].slot, "1/2");
        assert_eq!(tally.bad()[0].title, "Two");
    }

    #[tokio::test]
    async fn test_fetch_bibtex_timeout() {
        let err = fetch_bibtex("sleep", "5", 1)
            .await
            .expect_err("sleep should time out");
        assert!(matches!(err, HarvestError::Timeout(1, _)));
    }
}
