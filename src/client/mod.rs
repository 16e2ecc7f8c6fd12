//! Port of `scheduler/impala_api_client.py` / `scheduler/cloudera_manager.py`:
//! an HTTP session against the cluster manager's REST API, basic-auth'd
//! once at construction, with a bounded retry policy on idempotent calls.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Error, Result, TransportError};

const PAGE_LIMIT: u32 = 100;

/// Session against `<server>/api/<version>/clusters/<cluster>`. Basic auth
/// credentials are stored and attached per request — `reqwest` has no
/// session-wide auth primitive, so this is the behavioural equivalent of
/// "basic auth once at session creation".
#[derive(Debug, Clone)]
pub struct ClusterManagerClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ClusterManagerClient {
    pub fn new(
        server_url: &str,
        api_version: &str,
        cluster_name: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Transport(TransportError::Request {
                url: server_url.to_string(),
                source: e,
            }))?;

        Ok(Self {
            http,
            base_url: format!(
                "{}/api/{}/clusters/{}",
                server_url.trim_end_matches('/'),
                api_version,
                cluster_name
            ),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// At most two total attempts (one retry) with a short exponential
    /// backoff, for idempotent GET/POST calls that don't mutate state.
    async fn with_retry<F, Fut>(&self, op: F) -> Result<Value>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Value>>,
    {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(1))
            .with_max_elapsed_time(Some(Duration::from_secs(2)))
            .build();

        backoff::future::retry(backoff, || async {
            op().await.map_err(|e| match &e {
                Error::Transport(_) => backoff::Error::transient(e),
                _ => backoff::Error::permanent(e),
            })
        })
        .await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Request { url: url.clone(), source: e }))?;
        self.parse_response(url, response).await
    }

    async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let mut request = self.http.post(&url).basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Request { url: url.clone(), source: e }))?;
        self.parse_response(url, response).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, "PUT");
        let response = self
            .http
            .put(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Request { url: url.clone(), source: e }))?;
        self.parse_response(url, response).await
    }

    async fn parse_response(&self, url: String, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(TransportError::BadStatus {
                url,
                status: status.as_u16(),
                body,
            }));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Transport(TransportError::Request { url, source: e }))
    }

    /// `{queries: [...]}` for the half-open-ish `[from, to]` window, paged
    /// at `limit=100, offset=0` (the aggregator walks multiple pages).
    #[instrument(skip(self))]
    pub async fn get_queries(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter_str: &str,
    ) -> Result<Value> {
        let path = format!(
            "/impala/queries?from={}&to={}&filter={}&limit={}&offset=0",
            from.to_rfc3339(),
            to.to_rfc3339(),
            urlencoding_component(filter_str),
            PAGE_LIMIT,
        );
        self.with_retry(|| self.get(&path)).await
    }

    #[instrument(skip(self))]
    pub async fn get_query_details(&self, query_id: &str) -> Result<Value> {
        let path = format!("/impala/queries/{query_id}");
        self.with_retry(|| self.get(&path)).await
    }

    #[instrument(skip(self))]
    pub async fn get_config(&self, view: &str) -> Result<Value> {
        let path = format!("/services/impala/config?view={view}");
        self.with_retry(|| self.get(&path)).await
    }

    /// PUT the new engine configuration. Intentionally single-attempt — the
    /// retry decorator is never composed onto writes (spec.md §4.2, §9).
    #[instrument(skip(self, document))]
    pub async fn update_config(&self, document: &Value) -> Result<Value> {
        self.put("/services/impala/config", document).await
    }

    #[instrument(skip(self))]
    pub async fn refresh_pools(&self) -> Result<Value> {
        let path = "/services/impala/commands/poolRefresh".to_string();
        self.with_retry(|| self.post(&path, None)).await
    }

    #[instrument(skip(self))]
    pub async fn get_roles(&self) -> Result<Value> {
        self.with_retry(|| self.get("/roles")).await
    }
}

fn urlencoding_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
