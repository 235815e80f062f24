//! MediaWiki API client.
//!
//! The [`WikiClient`] trait decouples the engine from the live encyclopedia.
//! Tests use scripted clients that serve canned responses without touching the
//! network.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

const API_URL: &str = "https://ja.wikipedia.org/w/api.php";
const USER_AGENT: &str = "golf/0.1 (wikipedia golf runner)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Query operations the engine needs from the encyclopedia.
pub trait WikiClient {
    /// Up to `limit` random article titles. Fewer than requested is a
    /// caller-visible condition, not an error.
    fn random_titles(&self, limit: u32) -> Result<Vec<String>>;

    /// Full outbound link list for a page, merged across pagination.
    /// `None` means the page does not exist upstream.
    fn links(&self, title: &str) -> Result<Option<Vec<String>>>;

    /// Short plain-text introduction of a page, if available.
    fn page_abstract(&self, title: &str) -> Result<Option<String>>;

    /// Number of pages linking to `title`.
    fn backlink_count(&self, title: &str) -> Result<u64>;
}

/// [`WikiClient`] backed by the live MediaWiki HTTP API.
pub struct HttpWikiClient {
    client: reqwest::blocking::Client,
    api_url: String,
}

impl HttpWikiClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build wiki http client")?;
        Ok(Self {
            client,
            api_url: API_URL.to_string(),
        })
    }

    /// Point the client at a different API endpoint (used by tests).
    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new()?;
        client.api_url = api_url.into();
        Ok(client)
    }

    fn get(&self, params: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .context("mediawiki request failed")?
            .error_for_status()
            .context("mediawiki returned an error status")?;
        response.json().context("parse mediawiki response json")
    }
}

impl WikiClient for HttpWikiClient {
    fn random_titles(&self, limit: u32) -> Result<Vec<String>> {
        let result = self.get(&[
            ("action", "query".into()),
            ("format", "json".into()),
            ("list", "random".into()),
            ("rnlimit", limit.to_string()),
            ("rnnamespace", "0".into()),
        ])?;
        let pages = result["query"]["random"]
            .as_array()
            .ok_or_else(|| anyhow!("malformed random-page response"))?;
        let titles = pages
            .iter()
            .filter_map(|page| page["title"].as_str())
            .map(str::to_string)
            .collect();
        Ok(titles)
    }

    fn links(&self, title: &str) -> Result<Option<Vec<String>>> {
        let mut extra: Vec<(String, String)> = Vec::new();
        let mut links: Vec<String> = Vec::new();
        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("action", "query".into()),
                ("format", "json".into()),
                ("prop", "links".into()),
                ("titles", title.into()),
                ("pllimit", "500".into()),
                ("plnamespace", "0".into()),
            ];
            for (key, value) in &extra {
                params.push((key.as_str(), value.clone()));
            }
            let result = self.get(&params)?;

            let pages = result["query"]["pages"]
                .as_object()
                .ok_or_else(|| anyhow!("malformed links response for {title}"))?;
            for page_info in pages.values() {
                if page_info.get("missing").is_some() {
                    return Ok(None);
                }
                if page_info["title"].as_str().map(str::trim) != Some(title.trim()) {
                    continue;
                }
                if let Some(page_links) = page_info["links"].as_array() {
                    links.extend(
                        page_links
                            .iter()
                            .filter_map(|link| link["title"].as_str())
                            .map(|t| t.trim().to_string()),
                    );
                }
            }

            match result.get("continue").and_then(Value::as_object) {
                Some(cont) => {
                    extra = cont
                        .iter()
                        .map(|(key, value)| (key.clone(), value_to_param(value)))
                        .collect();
                }
                None => break,
            }
        }
        debug!(title, count = links.len(), "fetched outbound links");
        Ok(Some(links))
    }

    fn page_abstract(&self, title: &str) -> Result<Option<String>> {
        let result = self.get(&[
            ("action", "query".into()),
            ("format", "json".into()),
            ("prop", "extracts".into()),
            ("titles", title.into()),
            ("exchars", "1000".into()),
            ("exintro", "1".into()),
            ("explaintext", "1".into()),
        ])?;
        let pages = result["query"]["pages"]
            .as_object()
            .ok_or_else(|| anyhow!("malformed extracts response for {title}"))?;
        for page_info in pages.values() {
            if page_info["title"].as_str() == Some(title) {
                return Ok(page_info["extract"].as_str().map(str::to_string));
            }
        }
        Ok(None)
    }

    fn backlink_count(&self, title: &str) -> Result<u64> {
        let mut extra: Vec<(String, String)> = Vec::new();
        let mut count = 0u64;
        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("action", "query".into()),
                ("format", "json".into()),
                ("list", "backlinks".into()),
                ("bltitle", title.into()),
                ("bllimit", "500".into()),
                ("blnamespace", "0".into()),
            ];
            for (key, value) in &extra {
                params.push((key.as_str(), value.clone()));
            }
            let result = self.get(&params)?;

            if let Some(backlinks) = result["query"]["backlinks"].as_array() {
                count += backlinks.len() as u64;
            }
            match result.get("continue").and_then(Value::as_object) {
                Some(cont) => {
                    extra = cont
                        .iter()
                        .map(|(key, value)| (key.clone(), value_to_param(value)))
                        .collect();
                }
                None => break,
            }
        }
        Ok(count)
    }
}

/// Continuation tokens arrive as strings or numbers; both go back as-is.
fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_params_round_trip_strings_and_numbers() {
        assert_eq!(value_to_param(&Value::String("plcontinue|x".into())), "plcontinue|x");
        assert_eq!(value_to_param(&serde_json::json!(42)), "42");
    }
}
