//! Web search adapter -- the `web_search` built-in tool.
//!
//! Search priority:
//!   1. Brave Search API (if `BRAVE_API_KEY` is set)
//!   2. DuckDuckGo HTML results page (no key needed)
//!
//! Both backends return results as `{title, url, snippet}` objects.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};
use crate::traits::{Adapter, ToolDefinition, not_found, optional_usize, required_str};

// ═══════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════

/// Name of the tool this adapter exposes.
pub const WEB_SEARCH_TOOL: &str = "web_search";

/// Default number of results to return.
const DEFAULT_COUNT: usize = 5;

/// Upper bound on requested results.
const MAX_COUNT: usize = 20;

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Browser-like User-Agent; the HTML endpoint rejects obvious bots.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

// ═══════════════════════════════════════════════════════════════════════
//  Adapter
// ═══════════════════════════════════════════════════════════════════════

/// Web search with Brave-then-DuckDuckGo fallback.
pub struct WebSearchAdapter {
    client: reqwest::Client,
    brave_api_key: Option<String>,
    brave_url: String,
    duckduckgo_url: String,
}

impl WebSearchAdapter {
    /// Create the adapter, reading `BRAVE_API_KEY` from the environment.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let brave_api_key = std::env::var("BRAVE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        Self {
            client,
            brave_api_key,
            brave_url: BRAVE_SEARCH_URL.to_string(),
            duckduckgo_url: DUCKDUCKGO_HTML_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_brave_key(mut self, key: Option<String>) -> Self {
        self.brave_api_key = key.filter(|k| !k.is_empty());
        self
    }

    /// Point both backends somewhere else (self-hosted proxies, tests).
    #[must_use]
    pub fn with_endpoints(mut self, brave_url: impl Into<String>, duckduckgo_url: impl Into<String>) -> Self {
        self.brave_url = brave_url.into();
        self.duckduckgo_url = duckduckgo_url.into();
        self
    }

    /// Run a search, trying Brave first when a key is configured.
    pub async fn search(&self, query: &str, count: usize) -> Result<Value> {
        let count = count.clamp(1, MAX_COUNT);
        debug!(query, count, "performing web search");

        if let Some(api_key) = &self.brave_api_key {
            match self.search_brave(query, count, api_key).await {
                Ok(results) if !results.is_empty() => {
                    debug!(count = results.len(), engine = "brave", "search completed");
                    return Ok(json!({ "engine": "brave", "results": results }));
                }
                Ok(_) => debug!("Brave returned no results, falling back to DuckDuckGo"),
                Err(e) => warn!(error = %e, "Brave Search failed, falling back"),
            }
        }

        let results = self.search_duckduckgo(query, count).await?;
        debug!(count = results.len(), engine = "duckduckgo", "search completed");
        Ok(json!({ "engine": "duckduckgo", "results": results }))
    }

    // ───────────────────────────────────────────────────────────────────
    //  Brave Search API
    // ───────────────────────────────────────────────────────────────────

    async fn search_brave(&self, query: &str, count: usize, api_key: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.brave_url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &count.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(search_failed(format!(
                "Brave Search returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        Ok(parse_brave_results(&body, count))
    }

    // ───────────────────────────────────────────────────────────────────
    //  DuckDuckGo HTML
    // ───────────────────────────────────────────────────────────────────

    async fn search_duckduckgo(&self, query: &str, count: usize) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(&self.duckduckgo_url)
            .form(&[("q", query), ("kl", ""), ("df", "")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(search_failed(format!(
                "DuckDuckGo returned status {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        Ok(parse_duckduckgo_results(&html, count))
    }
}

impl Default for WebSearchAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn search_failed(reason: String) -> AdapterError {
    AdapterError::ExecutionFailed {
        tool_name: WEB_SEARCH_TOOL.into(),
        reason,
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Result parsing
// ═══════════════════════════════════════════════════════════════════════

fn parse_brave_results(body: &Value, count: usize) -> Vec<Value> {
    let Some(items) = body.pointer("/web/results").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title").and_then(Value::as_str).unwrap_or("");
            let url = item.get("url").and_then(Value::as_str).unwrap_or("");
            let snippet = item.get("description").and_then(Value::as_str).unwrap_or("");
            (!title.is_empty() || !url.is_empty()).then(|| {
                json!({
                    "title": strip_html_tags(title),
                    "url": url,
                    "snippet": strip_html_tags(snippet),
                })
            })
        })
        .take(count)
        .collect()
}

fn parse_duckduckgo_results(html: &str, count: usize) -> Vec<Value> {
    const TITLE_MARKER: &str = "class=\"result__a\"";
    const SNIPPET_MARKER: &str = "class=\"result__snippet\"";

    let title_positions: Vec<usize> = html.match_indices(TITLE_MARKER).map(|(i, _)| i).collect();
    let snippet_positions: Vec<usize> = html.match_indices(SNIPPET_MARKER).map(|(i, _)| i).collect();

    let mut results = Vec::new();
    for (i, &title_pos) in title_positions.iter().enumerate() {
        if results.len() >= count {
            break;
        }

        let url = extract_href_before(&html[..title_pos])
            .map(|u| clean_ddg_url(&u))
            .unwrap_or_default();
        let title = extract_tag_text(&html[title_pos + TITLE_MARKER.len()..], "</a>");
        let snippet = snippet_positions
            .get(i)
            .map(|&pos| strip_html_tags(&extract_tag_text(&html[pos + SNIPPET_MARKER.len()..], "</")))
            .unwrap_or_default();

        if !title.is_empty() || !url.is_empty() {
            results.push(json!({
                "title": strip_html_tags(&title),
                "url": url,
                "snippet": snippet.trim(),
            }));
        }
    }
    results
}

/// Resolve DuckDuckGo redirect links to their destination.
fn clean_ddg_url(url: &str) -> String {
    if url.contains("duckduckgo.com/l/")
        && let Some((_, query)) = url.split_once('?')
        && let Some((_, target)) =
            url::form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == "uddg")
    {
        return target.into_owned();
    }
    if url.starts_with("//") {
        return format!("https:{url}");
    }
    url.to_string()
}

fn extract_href_before(html_before: &str) -> Option<String> {
    const HREF: &str = "href=\"";
    let start = html_before.rfind(HREF)? + HREF.len();
    let remaining = &html_before[start..];
    let end = remaining.find('"')?;
    Some(remaining[..end].to_string())
}

fn extract_tag_text(html_after_marker: &str, end_marker: &str) -> String {
    let Some(close) = html_after_marker.find('>') else {
        return String::new();
    };
    let content = &html_after_marker[close + 1..];
    let end = content.find(end_marker).unwrap_or(content.len());
    content[..end].to_string()
}

/// Strip HTML tags and decode common entities.
pub fn strip_html_tags(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut inside_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => inside_tag = true,
            '>' => inside_tag = false,
            _ if !inside_tag => result.push(ch),
            _ => {}
        }
    }
    result
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}

// ═══════════════════════════════════════════════════════════════════════
//  Adapter trait implementation
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
impl Adapter for WebSearchAdapter {
    fn id(&self) -> &str {
        "web_search"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: WEB_SEARCH_TOOL.into(),
            description: "Search the web and return titles, URLs and snippets.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" },
                    "count": {
                        "type": "integer",
                        "description": "Number of results (default 5, max 20)"
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        match name {
            WEB_SEARCH_TOOL => {
                let query = required_str(&params, name, "query")?;
                if query.trim().is_empty() {
                    return Err(AdapterError::invalid(name, "query must not be empty"));
                }
                let count = optional_usize(&params, "count", DEFAULT_COUNT);
                self.search(query, count).await
            }
            _ => Err(not_found(self.id(), name)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    const DDG_PAGE: &str = r##"
        <div class="result">
          <a rel="nofollow" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc" class="result__a">The <b>Rust</b> Language</a>
          <a class="result__snippet" href="#">A language empowering &amp; fast.</a>
        </div>
        <div class="result">
          <a rel="nofollow" href="https://docs.rs/" class="result__a">Docs.rs</a>
          <a class="result__snippet" href="#">Crate docs</a>
        </div>
    "##;

    #[test]
    fn parses_duckduckgo_results() {
        let results = parse_duckduckgo_results(DDG_PAGE, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["title"], "The Rust Language");
        assert_eq!(results[0]["url"], "https://www.rust-lang.org/");
        assert_eq!(results[0]["snippet"], "A language empowering & fast.");
        assert_eq!(results[1]["url"], "https://docs.rs/");
    }

    #[test]
    fn duckduckgo_respects_count() {
        assert_eq!(parse_duckduckgo_results(DDG_PAGE, 1).len(), 1);
    }

    #[test]
    fn parses_brave_results() {
        let body = json!({"web": {"results": [
            {"title": "<strong>Tokio</strong>", "url": "https://tokio.rs", "description": "async"},
            {"title": "", "url": ""}
        ]}});
        let results = parse_brave_results(&body, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["title"], "Tokio");
    }

    #[test]
    fn protocol_relative_urls_get_https() {
        assert_eq!(clean_ddg_url("//example.com/a"), "https://example.com/a");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let adapter = WebSearchAdapter::new();
        let err = adapter
            .execute_tool(WEB_SEARCH_TOOL, json!({"query": "  "}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let err = WebSearchAdapter::new()
            .execute_tool("image_search", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::ToolNotFound { .. }));
    }
}
