//! Connection settings for a remote tool server.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use pv_domain::session::RemoteServerConfig;

use crate::transport::TransportError;

/// Where and how to reach a remote tool server.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl RemoteEndpoint {
    /// Build an endpoint from a stored descriptor config, merging its query
    /// parameters into the base URL.
    pub fn from_config(config: &RemoteServerConfig, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            url: merge_query(&config.url, &config.query)?,
            headers: config.headers.clone(),
            timeout,
        })
    }
}

/// Append `query` to the URL's existing query string. Parameters already
/// present on the URL with the same name are replaced.
pub fn merge_query(base: &str, query: &BTreeMap<String, String>) -> Result<Url, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
    if query.is_empty() {
        return Ok(url);
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !query.contains_key(k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept);
        pairs.extend_pairs(query.iter());
    }
    Ok(url)
}
