//! `web_fetch` native template: fetch a URL with strict limits, optionally
//! reducing HTML to readable text.
//!
//! Limits come from the tool's stored config:
//! - `timeout_secs` (default 20)
//! - `max_bytes` response size cap (default 5MB)
//! - `max_text_chars` text output cap (default 250k chars)
//!
//! Redirects are limited to 5 hops.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::group::{ReturnKind, ToolOperation};
use crate::native::NativeTool;

pub const TEMPLATE: &str = "web_fetch";

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/json,text/plain";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WebFetchConfig {
    timeout_secs: u64,
    max_bytes: usize,
    max_text_chars: usize,
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_bytes: 5 * 1024 * 1024,
            max_text_chars: 250_000,
        }
    }
}

pub struct WebFetchTool {
    client: reqwest::Client,
    config: WebFetchConfig,
}

impl WebFetchTool {
    pub fn new() -> Result<Self> {
        let config = WebFetchConfig::default();
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    async fn fetch(&self, arguments: &Map<String, Value>) -> Result<Value> {
        let url = arguments
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing argument: url"))?;
        let extract_text = arguments
            .get("extract_text")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("Palaver/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, DEFAULT_ACCEPT)
            .send()
            .await
            .with_context(|| format!("fetch {url}"))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > self.config.max_bytes {
                anyhow::bail!("response exceeded {} bytes", self.config.max_bytes);
            }
            buf.extend_from_slice(&chunk);
        }

        let raw = String::from_utf8_lossy(&buf);
        let text = if extract_text && content_type.contains("html") {
            html_to_text(&raw, self.config.max_text_chars)
        } else if content_type.contains("json") || content_type.contains("text/") || content_type.is_empty() {
            raw.chars().take(self.config.max_text_chars).collect()
        } else {
            String::new()
        };

        if !(200..400).contains(&status) {
            anyhow::bail!("{url} returned HTTP {status}");
        }

        Ok(json!({
            "url": url,
            "status": status,
            "content_type": content_type,
            "bytes": buf.len(),
            "text": text,
        }))
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .context("build HTTP client for web_fetch")
}

#[async_trait]
impl NativeTool for WebFetchTool {
    fn configure(&mut self, config: &Value) -> Result<()> {
        if config.is_null() {
            return Ok(());
        }
        let parsed: WebFetchConfig =
            serde_json::from_value(config.clone()).context("invalid web_fetch config")?;
        if parsed.timeout_secs != self.config.timeout_secs {
            self.client = build_client(parsed.timeout_secs)?;
        }
        self.config = parsed;
        Ok(())
    }

    fn operations(&self) -> Vec<ToolOperation> {
        vec![ToolOperation::new(
            "fetch",
            "Fetch a URL and return its readable text.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": { "type": "string", "description": "URL to fetch" },
                    "extract_text": { "type": "boolean", "default": true, "description": "Reduce HTML to readable text" }
                }
            }),
            ReturnKind::Structured,
        )]
    }

    async fn invoke(&self, _operation: &str, arguments: &Map<String, Value>) -> Result<Value> {
        self.fetch(arguments).await
    }
}

/// Strip tags, drop script/style content, decode common entities and
/// collapse whitespace. Output is capped at `max_chars` characters.
fn html_to_text(html: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut out_chars = 0usize;
    let mut in_tag = false;
    let mut skip_depth = 0usize;
    let mut tag = String::new();

    for ch in html.chars() {
        if out_chars >= max_chars {
            break;
        }
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let lower = tag.trim().to_ascii_lowercase();
                let name = lower.split_whitespace().next().unwrap_or("");
                match name {
                    "script" | "style" => skip_depth += 1,
                    "/script" | "/style" => skip_depth = skip_depth.saturating_sub(1),
                    "br" | "br/" => {
                        out.push('\n');
                        out_chars += 1;
                    }
                    _ if is_block_end(name) && !out.ends_with('\n') => {
                        out.push('\n');
                        out_chars += 1;
                    }
                    _ => {}
                }
            }
            _ if in_tag => tag.push(ch),
            _ if skip_depth > 0 => {}
            _ => {
                out.push(ch);
                out_chars += 1;
            }
        }
    }

    let decoded = out
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");

    let mut result = String::new();
    let mut blank = false;
    for line in decoded.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !blank {
                result.push('\n');
                blank = true;
            }
        } else {
            result.push_str(&line);
            result.push('\n');
            blank = false;
        }
    }
    result.trim().to_string()
}

fn is_block_end(tag: &str) -> bool {
    matches!(
        tag.strip_prefix('/'),
        Some(
            "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr" | "article" | "section"
                | "header" | "footer" | "blockquote"
        )
    )
}
