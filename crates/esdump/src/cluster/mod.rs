//! HTTP client for one Elasticsearch/OpenSearch index.
//!
//! Wraps the handful of REST endpoints a dump needs: cluster info,
//! search/scroll, bulk, and index mapping/settings. Every call maps a
//! transport failure onto the error kind of the endpoint's [`Role`].

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{TransferOptions, VersionSelector};
use crate::endpoint::{ClusterEndpoint, Role};
use crate::error::{Error, Result};
use crate::model::Record;

/// Validity window requested for scroll contexts.
pub const SCROLL_KEEP_ALIVE: &str = "10m";

/// Timeout for releasing a scroll context, independent of the run.
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(3);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Engine major version, as far as the wire format cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterVersion {
    /// 6.x: bulk actions carry `_type`.
    V6,
    /// 7.x and OpenSearch.
    V7,
    /// 8.x and later.
    V8,
}

impl ClusterVersion {
    /// Parses a `version.number` string such as `"7.17.3"`.
    #[must_use]
    pub fn from_number(number: &str) -> Option<Self> {
        let major: u32 = number.trim().split('.').next()?.parse().ok()?;
        match major {
            6 => Some(Self::V6),
            7 => Some(Self::V7),
            m if m >= 8 => Some(Self::V8),
            _ => None,
        }
    }

    /// The pinned version for a selector, or `None` for auto-detection.
    #[must_use]
    pub const fn from_selector(selector: VersionSelector) -> Option<Self> {
        match selector {
            VersionSelector::Auto => None,
            VersionSelector::V6 => Some(Self::V6),
            VersionSelector::V7 => Some(Self::V7),
            VersionSelector::V8 => Some(Self::V8),
        }
    }

    /// True when bulk action lines need a document type.
    #[must_use]
    pub const fn requires_doc_type(self) -> bool {
        matches!(self, Self::V6)
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V6 => f.write_str("6"),
            Self::V7 => f.write_str("7"),
            Self::V8 => f.write_str("8"),
        }
    }
}

/// Connection settings shared by every request of one client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Accept invalid TLS certificates.
    pub accept_invalid_certs: bool,
    /// API key, takes precedence over URL credentials.
    pub api_key: Option<String>,
    /// Version to speak, or auto-detect.
    pub version: VersionSelector,
}

impl ClientOptions {
    /// Client options for one side of a transfer.
    #[must_use]
    pub fn for_role(options: &TransferOptions, role: Role) -> Self {
        Self {
            timeout: Duration::from_secs(options.timeout_secs),
            accept_invalid_certs: options.accept_invalid_certs,
            api_key: options.api_key.clone(),
            version: match role {
                Role::Input => options.input_version,
                Role::Output => options.output_version,
            },
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            api_key: None,
            version: VersionSelector::Auto,
        }
    }
}

/// Search (and scroll) response.
#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    /// Scroll context id, present when the search opened or used one.
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    /// Hits container.
    #[serde(default)]
    pub hits: Hits,
}

/// Hits container of a search response.
#[derive(Debug, Default, Deserialize)]
pub struct Hits {
    /// Matching documents, in result order.
    #[serde(default)]
    pub hits: Vec<Record>,
}

/// Bulk response.
#[derive(Debug, Default, Deserialize)]
pub struct BulkResponse {
    /// True when at least one item failed.
    #[serde(default)]
    pub errors: bool,
    /// One entry per action, keyed by action name.
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

/// Result of a single bulk action.
#[derive(Debug, Default, Deserialize)]
pub struct BulkItem {
    /// Document id.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// HTTP status of the action.
    #[serde(default)]
    pub status: u16,
    /// Error object for failed actions.
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItem {
    /// True when the action did not succeed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status >= 300 || self.error.as_ref().is_some_and(|e| !e.is_null())
    }
}

impl BulkResponse {
    /// Failed items as `(id, reason)` pairs.
    #[must_use]
    pub fn failures(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .flat_map(HashMap::values)
            .filter(|item| item.is_failure())
            .map(|item| {
                let reason = item
                    .error
                    .as_ref()
                    .map_or_else(|| format!("status {}", item.status), error_reason);
                (item.id.clone().unwrap_or_default(), reason)
            })
            .collect()
    }
}

fn error_reason(error: &Value) -> String {
    match error.get("reason").and_then(Value::as_str) {
        Some(reason) => match error.get("type").and_then(Value::as_str) {
            Some(kind) => format!("{}: {}", kind, reason),
            None => reason.to_string(),
        },
        None => error.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    version: VersionInfo,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    number: String,
    #[serde(default)]
    distribution: Option<String>,
}

/// Creates a configured HTTP client.
///
/// # Errors
///
/// Returns a config error if the TLS backend cannot be initialised.
pub fn create_http_client(timeout: Duration, accept_invalid_certs: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Maps a non-success HTTP status onto an error for the given role.
pub fn handle_http_error(role: Role, status_code: u16, body: &str, operation: &str) -> Error {
    match status_code {
        401 | 403 => role.error(format!(
            "{} {} auth failed ({}): {}",
            role, operation, status_code, body
        )),
        429 => role.error(format!("{} {} rate limited: {}", role, operation, body)),
        _ => role.error(format!(
            "{} {} error {}: {}",
            role, operation, status_code, body
        )),
    }
}

/// Client bound to one cluster index.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    http: Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
    version: ClusterVersion,
    role: Role,
}

impl ClusterClient {
    /// Connects to a cluster, detecting its version unless one is pinned.
    ///
    /// # Errors
    ///
    /// Returns a source or sink error (by role) if the cluster cannot be
    /// reached or reports an unsupported version.
    pub async fn connect(
        endpoint: &ClusterEndpoint,
        role: Role,
        options: &ClientOptions,
    ) -> Result<Self> {
        let mut client = Self {
            http: create_http_client(options.timeout, options.accept_invalid_certs)?,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            index: endpoint.index.clone(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            api_key: options.api_key.clone(),
            version: ClusterVersion::V7,
            role,
        };

        client.version = match ClusterVersion::from_selector(options.version) {
            Some(pinned) => pinned,
            None => client.detect_version().await?,
        };

        info!(
            "Connected to {} cluster {} (index={}, version={})",
            role, client.base_url, client.index, client.version
        );

        Ok(client)
    }

    /// Target index.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Negotiated engine version.
    #[must_use]
    pub fn version(&self) -> ClusterVersion {
        self.version
    }

    /// Which side of the transfer this client serves.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Reads `version.number` from the cluster root.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the version is unsupported.
    pub async fn detect_version(&self) -> Result<ClusterVersion> {
        let url = format!("{}/", self.base_url);
        let info: InfoResponse = self
            .send_json(self.request(Method::GET, &url), "info")
            .await?;

        if info
            .version
            .distribution
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case("opensearch"))
        {
            debug!("OpenSearch {} detected, using 7.x protocol", info.version.number);
            return Ok(ClusterVersion::V7);
        }

        ClusterVersion::from_number(&info.version.number).ok_or_else(|| {
            self.role.error(format!(
                "unsupported {} cluster version: {}",
                self.role, info.version.number
            ))
        })
    }

    /// Runs a search against the index, opening a scroll context when
    /// `scroll` is set.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or a
    /// malformed body.
    pub async fn search(&self, body: &Value, scroll: bool) -> Result<SearchResponse> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let mut req = self.request(Method::POST, &url).json(body);
        if scroll {
            req = req.query(&[("scroll", SCROLL_KEEP_ALIVE)]);
        }
        self.send_json(req, "search").await
    }

    /// Fetches the next page of an open scroll context.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or a
    /// malformed body.
    pub async fn scroll(&self, scroll_id: &str) -> Result<SearchResponse> {
        let url = format!("{}/_search/scroll", self.base_url);
        let body = json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id });
        self.send_json(self.request(Method::POST, &url).json(&body), "scroll")
            .await
    }

    /// Releases a scroll context. Bounded by [`RELEASE_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster rejects the request. A context that
    /// is already gone is not an error.
    pub async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let url = format!("{}/_search/scroll", self.base_url);
        let body = json!({ "scroll_id": [scroll_id] });
        let req = self
            .request(Method::DELETE, &url)
            .json(&body)
            .timeout(RELEASE_TIMEOUT);

        let response = req
            .send()
            .await
            .map_err(|e| self.role.error(format!("clear scroll request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("scroll context already released");
            return Ok(());
        }
        check_status(self.role, response, "clear scroll").await?;
        Ok(())
    }

    /// Sends a newline-delimited bulk body.
    ///
    /// # Errors
    ///
    /// Returns an error if the whole request fails. Per-item failures are
    /// reported in the response.
    pub async fn bulk(&self, body: String) -> Result<BulkResponse> {
        let url = format!("{}/_bulk", self.base_url);
        let req = self
            .request(Method::POST, &url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        self.send_json(req, "bulk").await
    }

    /// `GET /{index}/_mapping`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn get_mapping(&self) -> Result<Value> {
        let url = format!("{}/{}/_mapping", self.base_url, self.index);
        self.send_json(self.request(Method::GET, &url), "get mapping")
            .await
    }

    /// `GET /{index}/_settings`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn get_settings(&self) -> Result<Value> {
        let url = format!("{}/{}/_settings", self.base_url, self.index);
        self.send_json(self.request(Method::GET, &url), "get settings")
            .await
    }

    /// `PUT /{index}` with a create-index body (mappings, settings).
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn create_index(&self, body: &Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, self.index);
        self.send(self.request(Method::PUT, &url).json(body), "create index")
            .await?;
        Ok(())
    }

    /// `PUT /{index}/_settings`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn put_settings(&self, body: &Value) -> Result<()> {
        let url = format!("{}/{}/_settings", self.base_url, self.index);
        self.send(self.request(Method::PUT, &url).json(body), "put settings")
            .await?;
        Ok(())
    }

    /// Builds an authenticated request.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.http.request(method, url);

        if let Some(api_key) = &self.api_key {
            req.header(AUTHORIZATION, format!("ApiKey {}", api_key))
        } else if let Some(user) = &self.username {
            req.basic_auth(user, self.password.as_deref())
        } else {
            req
        }
    }

    async fn send(&self, req: RequestBuilder, operation: &str) -> Result<Response> {
        let response = req
            .send()
            .await
            .map_err(|e| self.role.error(format!("{} request failed: {}", operation, e)))?;
        check_status(self.role, response, operation).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        self.send(req, operation).await?.json::<T>().await.map_err(|e| {
            self.role
                .error(format!("Failed to parse {} response: {}", operation, e))
        })
    }
}

async fn check_status(role: Role, response: Response, operation: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(handle_http_error(role, status, &body, operation))
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
