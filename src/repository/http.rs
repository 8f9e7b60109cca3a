//! HTTP source repository
//!
//! reqwest client for the source configuration API. Patches are sent as
//! `application/json-patch+json` arrays.

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder};
use rule_attach_types::{PatchOperation, Rule, SourceSummary};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{Result, RuleCatalog, SourceRepository};
use crate::config::RuleAttachConfig;
use crate::error::RepositoryError;

const JSON_PATCH: &str = "application/json-patch+json";
const ERROR_BODY_LIMIT: usize = 200;

pub struct HttpSourceRepository {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpSourceRepository {
    pub fn new(config: &RuleAttachConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rule-attach/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} failed with {}", what, status);
            return Err(RepositoryError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SourceRepository for HttpSourceRepository {
    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let url = self.url("v3/sources")?;
        self.send(self.request(Method::GET, url), "list sources")
            .await
    }

    async fn get_source(&self, id: &str) -> Result<Value> {
        let url = self.url(&format!("v3/sources/{id}"))?;
        match self.send(self.request(Method::GET, url), "get source").await {
            Err(RepositoryError::Status { status: 404, .. }) => Err(RepositoryError::NotFound {
                id: id.to_string(),
            }),
            other => other,
        }
    }

    async fn patch_source(&self, id: &str, operations: &[PatchOperation]) -> Result<Value> {
        let url = self.url(&format!("v3/sources/{id}"))?;
        debug!("PATCH {} with {} operation(s)", url, operations.len());
        let builder = self
            .request(Method::PATCH, url)
            .header(header::CONTENT_TYPE, JSON_PATCH)
            .body(serde_json::to_vec(operations)?);
        self.send(builder, "patch source").await
    }
}

#[async_trait]
impl RuleCatalog for HttpSourceRepository {
    async fn list_rules(&self) -> Result<Vec<Rule>> {
        let url = self.url("v3/connector-rules")?;
        self.send(self.request(Method::GET, url), "list rules")
            .await
    }
}
