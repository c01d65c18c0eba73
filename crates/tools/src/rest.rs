//! Tool groups backed by an HTTP API described by an OpenAPI document.
//!
//! Parsing the document is left to a [`SpecParser`] implementation; this
//! module maps each parsed [`ApiOperation`] to a tool and turns tool
//! arguments back into an HTTP request against the configured server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use pv_domain::session::RestApiConfig;

use crate::group::{ReturnKind, ToolError, ToolGroup, ToolOperation};
use crate::scope::Release;

/// Argument name carrying the JSON request body.
pub const BODY_ARG: &str = "body";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsed operations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiParameter {
    pub name: String,
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default = "string_schema")]
    pub schema: Value,
}

fn string_schema() -> Value {
    json!({ "type": "string" })
}

/// One HTTP operation from an API description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiOperation {
    pub operation_id: String,
    /// Upper-case HTTP method.
    pub method: String,
    /// Path template, e.g. `/pets/{petId}`.
    pub path: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub parameters: Vec<ApiParameter>,
    /// JSON Schema of the request body, if the operation takes one.
    #[serde(default)]
    pub request_body: Option<Value>,
}

impl ApiOperation {
    /// JSON Schema of the tool arguments for this operation.
    fn argument_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let mut schema = p.schema.clone();
            if !p.description.is_empty() {
                if let Value::Object(obj) = &mut schema {
                    obj.insert("description".into(), Value::String(p.description.clone()));
                }
            }
            properties.insert(p.name.clone(), schema);
            if p.required || p.location == ParamLocation::Path {
                required.push(Value::String(p.name.clone()));
            }
        }
        if let Some(body) = &self.request_body {
            properties.insert(BODY_ARG.into(), body.clone());
            required.push(Value::String(BODY_ARG.into()));
        }
        json!({ "type": "object", "properties": properties, "required": required })
    }
}

/// Turns API description bytes into operations.
pub trait SpecParser: Send + Sync {
    fn parse_openapi(&self, bytes: &[u8]) -> Result<Vec<ApiOperation>, ToolError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RestApiGroup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RestApiGroup {
    label: String,
    client: reqwest::Client,
    server_url: Url,
    operations: Vec<ApiOperation>,
    closed: AtomicBool,
}

impl RestApiGroup {
    /// Build a group from parsed operations. When the config carries an
    /// allow list, only operations whose id or path is listed are kept.
    pub fn new(
        label: impl Into<String>,
        config: &RestApiConfig,
        operations: Vec<ApiOperation>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let server_url = Url::parse(&config.server_url)
            .map_err(|e| ToolError::Config(format!("server_url {}: {e}", config.server_url)))?;
        if server_url.cannot_be_a_base() {
            return Err(ToolError::Config(format!("server_url {} cannot be a base", config.server_url)));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ToolError::Config(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ToolError::Config(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        let operations: Vec<ApiOperation> = if config.allow.is_empty() {
            operations
        } else {
            operations
                .into_iter()
                .filter(|op| config.allow.iter().any(|a| *a == op.operation_id || *a == op.path))
                .collect()
        };

        Ok(Self {
            label: label.into(),
            client,
            server_url,
            operations,
            closed: AtomicBool::new(false),
        })
    }

    fn build_url(&self, op: &ApiOperation, args: &Map<String, Value>) -> Result<Url, ToolError> {
        let mut url = self.server_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ToolError::Config("server_url cannot be a base".into()))?;
            segments.pop_if_empty();
            for raw in op.path.split('/').filter(|s| !s.is_empty()) {
                segments.push(&fill_placeholders(raw, args)?);
            }
        }

        let query: Vec<(String, String)> = op
            .parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
            .filter_map(|p| args.get(&p.name).map(|v| (p.name.clone(), scalar_string(v))))
            .collect();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

/// Replace `{name}` placeholders in one path segment.
fn fill_placeholders(segment: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
    let mut out = String::new();
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = args
            .get(name)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing path parameter: {name}")))?;
        out.push_str(&rest[..start]);
        out.push_str(&scalar_string(value));
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ToolGroup for RestApiGroup {
    fn operations(&self) -> Vec<ToolOperation> {
        self.operations
            .iter()
            .map(|op| {
                let description = if op.summary.is_empty() {
                    format!("{} {}", op.method, op.path)
                } else {
                    op.summary.clone()
                };
                ToolOperation::new(op.operation_id.clone(), description, op.argument_schema(), ReturnKind::Structured)
            })
            .collect()
    }

    async fn invoke(&self, operation: &str, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolError::Unavailable(self.label.clone()));
        }
        let op = self
            .operations
            .iter()
            .find(|op| op.operation_id == operation)
            .ok_or_else(|| ToolError::UnknownOperation(operation.to_owned()))?;

        let method = Method::from_bytes(op.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| ToolError::Config(format!("{}: {e}", op.method)))?;
        let url = self.build_url(op, arguments)?;

        let mut req = self.client.request(method.clone(), url);
        for p in op.parameters.iter().filter(|p| p.location == ParamLocation::Header) {
            if let Some(v) = arguments.get(&p.name) {
                req = req.header(p.name.as_str(), scalar_string(v));
            }
        }
        if op.request_body.is_some() {
            if let Some(body) = arguments.get(BODY_ARG) {
                req = req.json(body);
            }
        }

        tracing::debug!(api = %self.label, operation, %method, "calling REST operation");
        let resp = req.send().await?;
        let status = resp.status();
        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        if is_json {
            serde_json::from_str(&text).map_err(|e| ToolError::Http(format!("invalid JSON response: {e}")))
        } else {
            Ok(Value::String(text))
        }
    }
}

#[async_trait]
impl Release for RestApiGroup {
    fn label(&self) -> String {
        format!("rest:{}", self.label)
    }

    async fn release(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
