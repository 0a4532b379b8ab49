//! Search URL construction for both providers.
//!
//! Builds fully percent-encoded request URLs from a parameter set. No
//! semantic validation happens here; a nonsensical parameter simply yields
//! an empty or error result page downstream.

use crate::error::{HarvestError, Result};
use url::Url;

/// Default arXiv search endpoint
pub const DEFAULT_ARXIV_URL: &str = "https://arxiv.org/search/";

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Query parameters for an arXiv search results page
#[derive(Debug, Clone)]
pub struct ArxivQuery {
    /// Free-text boolean query string
    pub query: String,
    /// Field scope, e.g. "all"
    pub searchtype: String,
    /// Whether abstracts are shown ("show" / "hide")
    pub abstracts: String,
    /// Results per page
    pub size: u32,
    /// Sort order (empty string = relevance)
    pub order: String,
}

impl Default for ArxivQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            searchtype: "all".to_string(),
            abstracts: "show".to_string(),
            size: 200,
            order: String::new(),
        }
    }
}

impl ArxivQuery {
    /// Build the search URL for this query.
    pub fn to_url(&self, base_url: &str) -> Result<Url> {
        let mut url = Url::parse(base_url)
            .map_err(|e| HarvestError::Config(format!("Invalid arXiv base URL: {}", e)))?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("searchtype", &self.searchtype);
            params.append_pair("query", &self.query);
            params.append_pair("abstracts", &self.abstracts);
            params.append_pair("size", &self.size.to_string());
            params.append_pair("order", &self.order);
        }

        Ok(url)
    }
}

/// Query parameters for a Google Scholar search results page
#[derive(Debug, Clone)]
pub struct ScholarQuery {
    /// Free-text boolean query string
    pub query: String,
    /// Source data type filter (default "0,14")
    pub sdt: String,
    /// Year lower bound
    pub ylo: i32,
    /// Year upper bound
    pub yhi: i32,
}

impl ScholarQuery {
    /// Build the search URL for one results page (1-indexed).
    ///
    /// The `start` offset is `(page - 1) * 10`, matching Scholar's ten
    /// results per page.
    pub fn to_url(&self, base_url: &str, page: u32) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/scholar", base_url.trim_end_matches('/')))
            .map_err(|e| HarvestError::Config(format!("Invalid Scholar base URL: {}", e)))?;

        let start = (page.saturating_sub(1)) * 10;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("start", &start.to_string());
            params.append_pair("q", &self.query);
            params.append_pair("hl", "en");
            params.append_pair("as_sdt", &self.sdt);
            params.append_pair("as_ylo", &self.ylo.to_string());
            params.append_pair("as_yhi", &self.yhi.to_string());
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_arxiv_url_round_trip() {
        let q = ArxivQuery {
            query: "(dark pattern OR dark patterns) AND experiment*".to_string(),
            ..Default::default()
        };
        let url = q.to_url(DEFAULT_ARXIV_URL).expect("Failed to build URL");
        let params = query_map(&url);

        assert_eq!(
            params.get("query").map(String::as_str),
            Some("(dark pattern OR dark patterns) AND experiment*")
        );
        assert_eq!(params.get("searchtype").map(String::as_str), Some("all"));
        assert_eq!(params.get("abstracts").map(String::as_str), Some("show"));
        assert_eq!(params.get("size").map(String::as_str), Some("200"));
        assert_eq!(params.get("order").map(String::as_str), Some(""));
    }

    #[test]
    fn test_arxiv_url_encodes_specials() {
        let q = ArxivQuery {
            query: "a&b=c #d".to_string(),
            ..Default::default()
        };
        let url = q.to_url(DEFAULT_ARXIV_URL).expect("Failed to build URL");
        // Round-trip through the decoder must recover the raw value
        assert_eq!(
            query_map(&url).get("query").map(String::as_str),
            Some("a&b=c #d")
        );
    }

    #[test]
    fn test_scholar_url_first_page() {
        let q = ScholarQuery {
            query: "\"dark pattern\" AND (experiment*)".to_string(),
            sdt: "0,14".to_string(),
            ylo: 2010,
            yhi: 2025,
        };
        let url = q.to_url(DEFAULT_SCHOLAR_URL, 1).expect("Failed to build URL");
        let params = query_map(&url);

        assert_eq!(params.get("start").map(String::as_str), Some("0"));
        assert_eq!(
            params.get("q").map(String::as_str),
            Some("\"dark pattern\" AND (experiment*)")
        );
        assert_eq!(params.get("as_ylo").map(String::as_str), Some("2010"));
        assert_eq!(params.get("as_yhi").map(String::as_str), Some("2025"));
        assert_eq!(params.get("as_sdt").map(String::as_str), Some("0,14"));
    }

    #[test]
    fn test_scholar_url_page_offset() {
        let q = ScholarQuery {
            query: "test".to_string(),
            sdt: "0,14".to_string(),
            ylo: 2010,
            yhi: 2025,
        };
        let url = q.to_url(DEFAULT_SCHOLAR_URL, 3).expect("Failed to build URL");
        assert_eq!(
            query_map(&url).get("start").map(String::as_str),
            Some("20")
        );
    }

    #[test]
    fn test_scholar_url_trailing_slash_base() {
        let q = ScholarQuery {
            query: "test".to_string(),
            sdt: "0,5".to_string(),
            ylo: 2000,
            yhi: 2020,
        };
        let url = q
            .to_url("https://scholar.google.com/", 1)
            .expect("Failed to build URL");
        assert!(url.as_str().starts_with("https://scholar.google.com/scholar?"));
    }
}
