//! reqwest implementation of [`CommerceApi`]
//!
//! Per-resource CRUD goes through the REST endpoints
//! (`/admin/api/{version}/{resource}.json`); bulk jobs go through the
//! GraphQL endpoint. Every response updates the cached call-limit snapshot.
//! Retries are NOT built in: the engine classifies and retries failures.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LINK};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use domain::{Operation, OperationKind, RecordData, ResourceKind};

use crate::api::CommerceApi;
use crate::error::{CommerceApiError, CommerceResult};
use crate::types::{BulkJobStatus, RateLimitSnapshot, CALL_LIMIT_HEADER};

const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";
const DEFAULT_API_VERSION: &str = "2024-01";
const PAGE_LIMIT: u32 = 250;

const BULK_IMPORT_MUTATION: &str = r#"mutation bulkImport($resource: String!, $records: String!) {
  bulkOperationRunImport(resource: $resource, jsonl: $records) {
    bulkOperation { id status }
    userErrors { field message }
  }
}"#;

const BULK_STATUS_QUERY: &str = r#"query bulkStatus($id: ID!) {
  node(id: $id) {
    ... on BulkOperation { id status errorCode objectCount }
  }
}"#;

const BULK_CANCEL_MUTATION: &str = r#"mutation bulkCancel($id: ID!) {
  bulkOperationCancel(id: $id) {
    bulkOperation { id status }
    userErrors { field message }
  }
}"#;

/// Connection settings for [`HttpCommerceClient`]
#[derive(Debug, Clone)]
pub struct CommerceClientConfig {
    /// Store base URL, e.g. `https://example.myshopify.com`
    pub base_url: String,
    pub access_token: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl CommerceClientConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: 30,
        }
    }

    /// Read `COMMERCE_BASE_URL`, `COMMERCE_ACCESS_TOKEN` and the optional
    /// `COMMERCE_API_VERSION` / `COMMERCE_TIMEOUT_SECS`
    pub fn from_env() -> CommerceResult<Self> {
        dotenv::dotenv().ok();

        let base_url = std::env::var("COMMERCE_BASE_URL")
            .map_err(|_| CommerceApiError::Config("COMMERCE_BASE_URL not set".into()))?;
        let access_token = std::env::var("COMMERCE_ACCESS_TOKEN")
            .map_err(|_| CommerceApiError::Config("COMMERCE_ACCESS_TOKEN not set".into()))?;

        let mut config = Self::new(base_url, access_token);
        if let Ok(version) = std::env::var("COMMERCE_API_VERSION") {
            config.api_version = version;
        }
        if let Ok(timeout) = std::env::var("COMMERCE_TIMEOUT_SECS") {
            config.timeout_secs = timeout.parse().map_err(|_| {
                CommerceApiError::Config(format!("COMMERCE_TIMEOUT_SECS is not a number: {timeout}"))
            })?;
        }
        Ok(config)
    }
}

/// HTTP client for the target commerce store
#[derive(Debug)]
pub struct HttpCommerceClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    timeout_ms: u64,
    last_quota: Mutex<Option<RateLimitSnapshot>>,
}

impl HttpCommerceClient {
    pub fn new(config: CommerceClientConfig) -> CommerceResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_TOKEN_HEADER,
            HeaderValue::from_str(&config.access_token)
                .map_err(|_| CommerceApiError::Config("invalid access token characters".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| CommerceApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version,
            timeout_ms: config.timeout_secs * 1000,
            last_quota: Mutex::new(None),
        })
    }

    pub fn from_env() -> CommerceResult<Self> {
        Self::new(CommerceClientConfig::from_env()?)
    }

    fn rest_path(&self, resource: &str) -> String {
        format!("/admin/api/{}/{}.json", self.api_version, resource)
    }

    fn graphql_path(&self) -> String {
        self.rest_path("graphql")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Path and method for one operation
    fn route(&self, operation: &Operation) -> CommerceResult<(reqwest::Method, String)> {
        let plural = operation.resource_kind.plural();
        if operation.resource_kind == ResourceKind::Inventory {
            return match operation.operation_kind {
                OperationKind::Delete => Err(CommerceApiError::InvalidOperation(
                    "inventory levels cannot be deleted".into(),
                )),
                _ => Ok((reqwest::Method::POST, self.rest_path("inventory_levels/set"))),
            };
        }

        match (operation.operation_kind, operation.external_id.as_deref()) {
            (OperationKind::Create, _) => Ok((reqwest::Method::POST, self.rest_path(plural))),
            (OperationKind::Update, Some(id)) => {
                Ok((reqwest::Method::PUT, self.rest_path(&format!("{plural}/{id}"))))
            }
            (OperationKind::Delete, Some(id)) => {
                Ok((reqwest::Method::DELETE, self.rest_path(&format!("{plural}/{id}"))))
            }
            (kind, None) => Err(CommerceApiError::InvalidOperation(format!(
                "{kind} {} requires an external id",
                operation.resource_kind
            ))),
        }
    }

    /// Send a request, record the call-limit header and map non-2xx statuses
    async fn send(&self, request: reqwest::RequestBuilder, endpoint: &str) -> CommerceResult<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CommerceApiError::Timeout {
                    endpoint: endpoint.to_string(),
                    elapsed_ms: self.timeout_ms,
                }
            } else {
                CommerceApiError::Http {
                    endpoint: endpoint.to_string(),
                    source: e,
                }
            }
        })?;

        self.record_quota(response.headers());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(endpoint, status = status.as_u16(), "commerce API returned an error status");
            return Err(CommerceApiError::api(endpoint, status.as_u16(), body));
        }
        Ok(response)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder, endpoint: &str) -> CommerceResult<(Value, Option<String>)> {
        let response = self.send(request, endpoint).await?;
        let next = next_page_url(response.headers());
        let body = response.text().await.map_err(|e| CommerceApiError::Deserialization {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if body.trim().is_empty() {
            return Ok((Value::Null, next));
        }
        let value = serde_json::from_str(&body).map_err(|e| CommerceApiError::Deserialization {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok((value, next))
    }

    async fn graphql(&self, query: &str, variables: Value) -> CommerceResult<Value> {
        let endpoint = self.graphql_path();
        let request = self
            .client
            .post(self.url(&endpoint))
            .json(&json!({ "query": query, "variables": variables }));
        let (body, _) = self.send_json(request, &endpoint).await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(CommerceApiError::Rejected {
                    endpoint,
                    message: join_messages(errors),
                });
            }
        }
        body.get("data").cloned().ok_or_else(|| CommerceApiError::Deserialization {
            endpoint,
            reason: "missing data field".into(),
        })
    }

    fn record_quota(&self, headers: &HeaderMap) {
        let snapshot = headers
            .get(CALL_LIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RateLimitSnapshot::parse_header);
        if let Some(snapshot) = snapshot {
            *self.last_quota.lock() = Some(snapshot);
        }
    }
}

#[async_trait]
impl CommerceApi for HttpCommerceClient {
    async fn execute(&self, operation: &Operation) -> CommerceResult<RecordData> {
        let (method, endpoint) = self.route(operation)?;
        let singular = operation.resource_kind.as_str();

        let mut request = self.client.request(method, self.url(&endpoint));
        if operation.operation_kind != OperationKind::Delete {
            let body = if operation.resource_kind == ResourceKind::Inventory {
                Value::Object(operation.payload.clone())
            } else {
                let mut wrapper = serde_json::Map::new();
                wrapper.insert(singular.to_string(), Value::Object(operation.payload.clone()));
                Value::Object(wrapper)
            };
            request = request.json(&body);
        }

        let (body, _) = self.send_json(request, &endpoint).await?;
        let key = if operation.resource_kind == ResourceKind::Inventory {
            "inventory_level"
        } else {
            singular
        };
        Ok(body
            .get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_resources(&self, kind: ResourceKind) -> CommerceResult<Vec<RecordData>> {
        let endpoint = self.rest_path(kind.plural());
        let mut url = format!("{}?limit={}", self.url(&endpoint), PAGE_LIMIT);
        let mut records = Vec::new();

        loop {
            let (body, next) = self.send_json(self.client.get(&url), &endpoint).await?;
            let page = body
                .get(kind.plural())
                .and_then(Value::as_array)
                .ok_or_else(|| CommerceApiError::Deserialization {
                    endpoint: endpoint.clone(),
                    reason: format!("missing {} array", kind.plural()),
                })?;
            records.extend(page.iter().filter_map(|v| v.as_object().cloned()));

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        debug!(resource = %kind, records = records.len(), "listed existing resources");
        Ok(records)
    }

    async fn submit_bulk_job(&self, kind: ResourceKind, records: &[RecordData]) -> CommerceResult<String> {
        let jsonl = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CommerceApiError::InvalidOperation(format!("unserialisable record: {e}")))?
            .join("\n");

        let data = self
            .graphql(
                BULK_IMPORT_MUTATION,
                json!({ "resource": kind.plural(), "records": jsonl }),
            )
            .await?;
        let payload = &data["bulkOperationRunImport"];
        reject_user_errors(payload, &self.graphql_path())?;

        payload["bulkOperation"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CommerceApiError::Deserialization {
                endpoint: self.graphql_path(),
                reason: "bulk operation id missing".into(),
            })
    }

    async fn bulk_job_status(&self, job_id: &str) -> CommerceResult<BulkJobStatus> {
        let data = self.graphql(BULK_STATUS_QUERY, json!({ "id": job_id })).await?;
        serde_json::from_value(data["node"].clone()).map_err(|e| CommerceApiError::Deserialization {
            endpoint: self.graphql_path(),
            reason: e.to_string(),
        })
    }

    async fn cancel_bulk_job(&self, job_id: &str) -> CommerceResult<()> {
        let data = self.graphql(BULK_CANCEL_MUTATION, json!({ "id": job_id })).await?;
        if let Err(e) = reject_user_errors(&data["bulkOperationCancel"], &self.graphql_path()) {
            warn!(job_id, error = %e, "bulk job cancel rejected");
            return Err(e);
        }
        Ok(())
    }

    fn rate_limit_status(&self) -> Option<RateLimitSnapshot> {
        *self.last_quota.lock()
    }
}

fn reject_user_errors(payload: &Value, endpoint: &str) -> CommerceResult<()> {
    match payload.get("userErrors").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => Err(CommerceApiError::Rejected {
            endpoint: endpoint.to_string(),
            message: join_messages(errors),
        }),
        _ => Ok(()),
    }
}

fn join_messages(errors: &[Value]) -> String {
    errors
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("; ")
}

/// `Link: <https://…?page_info=abc>; rel="next"` → the next page URL
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (url, rel) = part.split_once(';')?;
        if !rel.contains("rel=\"next\"") {
            return None;
        }
        Some(url.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    })
}
