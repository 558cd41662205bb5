//! Operator-triggered queries against the REST API of running nodes.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ConfigRoot;
use crate::errors::{LocalnetError, LocalnetResult};
use crate::topology::Node;

const STATUS_ROUTE: &str = "/node/status";
const NONCE_METRIC: &str = "erd_nonce";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    pub label: String,
    pub nonce: u64,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    data: Option<StatusData>,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    metrics: Map<String, Value>,
}

pub async fn get_status(client: &reqwest::Client, node: &Node) -> LocalnetResult<NodeStatus> {
    let url = format!("{}{STATUS_ROUTE}", node.api_address());
    let http_error = |message: String| LocalnetError::Http {
        url: url.clone(),
        message,
    };

    debug!(target = "localnet::status", label = %node.label(), url = %url, "querying node status");
    let body: Value = client
        .get(&url)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| http_error(err.to_string()))?
        .json()
        .await
        .map_err(|err| http_error(err.to_string()))?;

    let nonce = parse_nonce(body).map_err(http_error)?;
    Ok(NodeStatus {
        label: node.label(),
        nonce,
    })
}

/// Queries every node; a node that does not answer does not hide the others.
pub async fn network_status(config: &ConfigRoot) -> Vec<(String, LocalnetResult<NodeStatus>)> {
    let client = reqwest::Client::new();
    let mut statuses = Vec::new();
    for node in config.all_nodes() {
        statuses.push((node.label(), get_status(&client, &node).await));
    }
    statuses
}

fn parse_nonce(body: Value) -> Result<u64, String> {
    let envelope: StatusEnvelope =
        serde_json::from_value(body).map_err(|err| format!("unexpected status payload: {err}"))?;
    let data = match envelope.data {
        Some(data) => data,
        None if !envelope.error.is_empty() => return Err(envelope.error),
        None => return Err("status payload has no data".to_string()),
    };
    data.metrics
        .get(NONCE_METRIC)
        .and_then(Value::as_u64)
        .ok_or_else(|| format!("status payload has no numeric `{NONCE_METRIC}`"))
}
