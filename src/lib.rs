//! # bibharvest
//!
//! arXiv & Google Scholar BibTeX harvesting pipeline
//!
//! ## Modules
//!
//! - [`query`] - Search URL construction for both providers
//! - [`arxiv`] - Plain-HTTP arXiv pipeline with a subprocess citation tool
//! - [`scholar`] - Driven-browser Google Scholar pipeline
//! - [`collector`] - Record accumulation and output writing
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bibharvest::{arxiv, collector::Collector, query::ArxivQuery};
//! use std::sync::Mutex;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = arxiv::ArxivConfig {
//!         base_url: bibharvest::query::DEFAULT_ARXIV_URL.to_string(),
//!         query: ArxivQuery { query: "dark patterns".to_string(), ..Default::default() },
//!         bibtex_tool: "arxiv2bib".to_string(),
//!         http_timeout_secs: 30,
//!         tool_timeout_secs: 30,
//!         politeness_delay_ms: 1000,
//!     };
//!     let collector = Mutex::new(Collector::new());
//!     arxiv::run(&cfg, &collector).await?;
//!     Ok(())
//! }
//! ```

pub mod arxiv;
pub mod collector;
pub mod error;
pub mod query;
pub mod scholar;

pub use error::{HarvestError, Result};
