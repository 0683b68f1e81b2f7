//! HTTP client for talking to a running daemon.
//!
//! Per spec.md §4.8: a thin wrapper used by short-lived processes (the CLI).
//! Probes `GET /status` before deciding whether to forward a call, translates
//! higher-level operations into requests against the daemon's routes (see
//! `mu-daemon`'s `http` module for the route list), and surfaces daemon
//! errors with a distinct kind so callers can fall back to opening the
//! mubase read-only themselves rather than treating every failure as fatal.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ContextResult;
use crate::error::MuError;
use crate::model::Node;
use crate::muql::executor::QueryResult;

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Distinct error kind for daemon calls, so callers (the CLI) can tell
/// "no daemon running" apart from "daemon rejected the request."
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The daemon did not respond within the probe/call timeout, or the
    /// connection was refused. Callers should fall back to a read-only open.
    #[error("daemon unreachable at {base_url}: {reason}")]
    Unreachable { base_url: String, reason: String },

    /// The daemon responded with a non-2xx status.
    #[error("daemon returned {status}: {message}")]
    Daemon { status: u16, message: String },

    /// The response body did not decode to the expected shape.
    #[error("malformed daemon response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether this failure means "no daemon to talk to" rather than
    /// "daemon is there but refused/errored on this call."
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable { .. })
    }
}

impl From<ClientError> for MuError {
    fn from(e: ClientError) -> Self {
        let retryable = e.is_unreachable();
        MuError::Upstream { message: e.to_string(), retryable, source: Some(Box::new(e)) }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Response shape for `GET /status`, mirroring the daemon's `StatusResponse`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonStatus {
    pub uptime_secs: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub schema_version: u32,
    pub connection_count: usize,
    pub vectors_indexed: usize,
    pub embedding_available: bool,
}

/// Node traversal direction, mirrored as a query-string value.
#[derive(Debug, Clone, Copy)]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        }
    }
}

#[derive(Serialize)]
struct QueryRequestBody<'a> {
    muql: &'a str,
}

#[derive(Serialize)]
struct ContextRequestBody<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct NodeEdgeTypesBody<'a> {
    node: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    edge_types: Option<&'a [String]>,
}

#[derive(Serialize, Default)]
struct CyclesBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    edge_types: Option<&'a [String]>,
}

/// Thin `reqwest` wrapper around one daemon's HTTP surface.
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    /// Build a client for a daemon listening at `base_url` (e.g.
    /// `http://127.0.0.1:7420`). Does not connect yet; call [`Self::probe`]
    /// first to decide whether to route calls here at all.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder().timeout(CALL_TIMEOUT).build().unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// `GET /status` with a short timeout. Returns `true` if a daemon
    /// answered, without surfacing the parsed body.
    pub async fn probe(&self) -> bool {
        self.status_with_timeout(PROBE_TIMEOUT).await.is_ok()
    }

    /// `GET /status`, full response.
    pub async fn status(&self) -> ClientResult<DaemonStatus> {
        self.status_with_timeout(CALL_TIMEOUT).await
    }

    async fn status_with_timeout(&self, timeout: Duration) -> ClientResult<DaemonStatus> {
        let response = self
            .http
            .get(self.url("/status"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;
        self.decode(response).await
    }

    /// `GET /nodes/{id}`.
    pub async fn get_node(&self, id: &str) -> ClientResult<Node> {
        let response =
            self.http.get(self.url(&format!("/nodes/{id}"))).send().await.map_err(|e| self.unreachable(&e))?;
        self.decode(response).await
    }

    /// `GET /nodes/{id}/neighbors?direction=&depth=&types=`.
    pub async fn neighbors(
        &self,
        id: &str,
        direction: Direction,
        depth: usize,
        edge_types: Option<&[String]>,
    ) -> ClientResult<Vec<Node>> {
        let mut query = vec![("direction", direction.as_str().to_string()), ("depth", depth.to_string())];
        if let Some(types) = edge_types {
            query.push(("types", types.join(",")));
        }
        let response = self
            .http
            .get(self.url(&format!("/nodes/{id}/neighbors")))
            .query(&query)
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;
        self.decode(response).await
    }

    /// `POST /query` `{muql}`.
    pub async fn query(&self, muql: &str) -> ClientResult<QueryResult> {
        let response = self
            .http
            .post(self.url("/query"))
            .json(&QueryRequestBody { muql })
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;
        self.decode(response).await
    }

    /// `POST /context` `{question, max_tokens?}`.
    pub async fn context(&self, question: &str, max_tokens: Option<u32>) -> ClientResult<ContextResult> {
        let response = self
            .http
            .post(self.url("/context"))
            .json(&ContextRequestBody { question, max_tokens })
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;
        self.decode(response).await
    }

    /// `POST /impact` `{node, edge_types?}`.
    pub async fn impact(&self, node: &str, edge_types: Option<&[String]>) -> ClientResult<Vec<String>> {
        self.node_edge_types_call("/impact", node, edge_types).await
    }

    /// `POST /ancestors` `{node, edge_types?}`.
    pub async fn ancestors(&self, node: &str, edge_types: Option<&[String]>) -> ClientResult<Vec<String>> {
        self.node_edge_types_call("/ancestors", node, edge_types).await
    }

    async fn node_edge_types_call(
        &self,
        path: &str,
        node: &str,
        edge_types: Option<&[String]>,
    ) -> ClientResult<Vec<String>> {
        let response = self
            .http
            .post(self.url(path))
            .json(&NodeEdgeTypesBody { node, edge_types })
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;
        self.decode(response).await
    }

    /// `POST /cycles` `{edge_types?}`.
    pub async fn cycles(&self, edge_types: Option<&[String]>) -> ClientResult<Vec<Vec<String>>> {
        let response = self
            .http
            .post(self.url("/cycles"))
            .json(&CyclesBody { edge_types })
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;
        self.decode(response).await
    }

    /// `GET /export?format=`. Returns the raw response body; `format` is
    /// `"mutext"` (plain text) or `"json"` (node/edge dump).
    pub async fn export(&self, format: &str) -> ClientResult<String> {
        let response =
            self.http.get(self.url("/export")).query(&[("format", format)]).send().await.map_err(|e| self.unreachable(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        if !status.is_success() {
            return Err(ClientError::Daemon { status: status.as_u16(), message: body });
        }
        Ok(body)
    }

    fn unreachable(&self, error: &reqwest::Error) -> ClientError {
        ClientError::Unreachable { base_url: self.base_url.clone(), reason: error.to_string() }
    }

    async fn decode<T: for<'de> Deserialize<'de>>(&self, response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Daemon { status: status.as_u16(), message: body });
        }
        response.json::<T>().await.map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_unreachable_distinguishes_kinds() {
        let unreachable = ClientError::Unreachable { base_url: "http://x".into(), reason: "refused".into() };
        assert!(unreachable.is_unreachable());

        let daemon_err = ClientError::Daemon { status: 404, message: "not found".into() };
        assert!(!daemon_err.is_unreachable());
    }

    #[test]
    fn test_client_error_converts_to_upstream() {
        let err: MuError = ClientError::Daemon { status: 500, message: "boom".into() }.into();
        assert!(matches!(err, MuError::Upstream { retryable: false, .. }));
    }

    #[tokio::test]
    async fn test_probe_fails_fast_against_unbound_port() {
        let client = DaemonClient::new("http://127.0.0.1:1");
        assert!(!client.probe().await);
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let client = DaemonClient::new("http://127.0.0.1:7420/");
        assert_eq!(client.url("/status"), "http://127.0.0.1:7420/status");
    }
}
