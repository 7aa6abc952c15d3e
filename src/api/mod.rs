use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::model::{
    CmInfo, Count, CpuStats, DiskStats, Mailing, MemoryStats, NetworkConfig, Page, Recipient,
    Satellite, TimeSettings, User, HourlyStat,
};
use crate::session::{AuthEvent, AuthEvents};

pub mod endpoints;
pub mod query;

pub use endpoints::{EndpointSpec, EndpointTable};
pub use query::QueryParams;

/// Resources that answer `.filter=total` with a bare `{total}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counted {
    Mailings,
    Recipients,
    Satellites,
}

impl Counted {
    pub fn resource(&self) -> &'static str {
        match self {
            Counted::Mailings => "mailings",
            Counted::Recipients => "recipients",
            Counted::Satellites => "satellites",
        }
    }
}

/// Every backend operation the console performs.
#[async_trait]
pub trait CloudMailingApi: Send + Sync {
    /// Install (or drop) the `Authorization: Basic <token>` default header.
    fn set_authorization(&self, token: Option<&str>);

    async fn authenticate(&self, username: &str, password: &str) -> ApiResult<User>;
    async fn current_user(&self) -> ApiResult<User>;
    async fn logout(&self) -> ApiResult<()>;

    async fn query_mailings(&self, params: &QueryParams) -> ApiResult<Page<Mailing>>;
    async fn get_mailing(&self, id: i64) -> ApiResult<Mailing>;
    async fn patch_mailing(&self, id: i64, body: &Value) -> ApiResult<Mailing>;
    async fn delete_mailing(&self, id: i64) -> ApiResult<()>;
    async fn query_recipients(&self, params: &QueryParams) -> ApiResult<Page<Recipient>>;
    async fn count(&self, what: Counted) -> ApiResult<Count>;

    async fn cm_info(&self) -> ApiResult<CmInfo>;
    async fn satellites(&self) -> ApiResult<Page<Satellite>>;
    async fn cpu(&self) -> ApiResult<CpuStats>;
    async fn memory(&self) -> ApiResult<MemoryStats>;
    async fn disk(&self) -> ApiResult<DiskStats>;
    async fn hourly_stats(&self, params: &QueryParams) -> ApiResult<Page<HourlyStat>>;

    async fn network(&self) -> ApiResult<NetworkConfig>;
    async fn update_network(&self, config: &NetworkConfig) -> ApiResult<NetworkConfig>;
    async fn time_settings(&self) -> ApiResult<TimeSettings>;
    async fn update_time_settings(&self, settings: &TimeSettings) -> ApiResult<TimeSettings>;
    async fn all_timezones(&self) -> ApiResult<Vec<String>>;
}

/// reqwest-backed client over the [`EndpointTable`].
#[derive(Clone)]
pub struct HttpApi {
    http: Client,
    base_url: String,
    endpoints: Arc<EndpointTable>,
    authorization: Arc<RwLock<Option<String>>>,
    events: AuthEvents,
}

impl fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.base_url)
            .field("endpoints", &self.endpoints.len())
            .finish_non_exhaustive()
    }
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, events: AuthEvents) -> ApiResult<Self> {
        let http = Client::builder()
            .user_agent("cm-admin/0.1")
            .build()?;
        Ok(Self::with_client(http, base_url, events))
    }

    pub fn from_config(cfg: &Config, events: AuthEvents) -> ApiResult<Self> {
        let http = Client::builder()
            .user_agent(cfg.server.user_agent.clone())
            .timeout(Duration::from_secs(cfg.server.timeout_seconds))
            .build()?;
        Ok(Self::with_client(http, cfg.server.base_url.clone(), events))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, events: AuthEvents) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            endpoints: Arc::new(EndpointTable::cloud_mailing()),
            authorization: Arc::new(RwLock::new(None)),
            events,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle on one resource of the endpoint table.
    pub fn resource(&self, name: &str) -> ApiResult<Resource<'_>> {
        let spec = self.endpoints.get(name)?;
        Ok(Resource { api: self, spec })
    }

    fn authorization_header(&self) -> Option<String> {
        self.authorization
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .map(|token| format!("Basic {token}"))
    }

    pub fn build_request(
        &self,
        spec: &EndpointSpec,
        method: Method,
        id: Option<&str>,
        params: &QueryParams,
        body: Option<&Value>,
    ) -> ApiResult<reqwest::Request> {
        spec.check(&method)?;
        let url: Url = spec.url(&self.base_url, id)?;
        let mut builder = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        if !params.is_empty() {
            builder = builder.query(params.pairs());
        }
        if let Some(auth) = self.authorization_header() {
            builder = builder.header("Authorization", auth);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    async fn execute(
        &self,
        spec: &EndpointSpec,
        method: Method,
        id: Option<&str>,
        params: &QueryParams,
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let request = self.build_request(spec, method, id, params, body)?;
        debug!(method = %request.method(), url = %request.url(), "api request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            if let Some(event) = AuthEvent::from_status(status.as_u16()) {
                self.events.emit(event);
            }
            warn!(%status, resource = %spec.resource, "api call failed");
            return Err(ApiError::from_status(status, &text));
        }

        let text = res.text().await?;
        debug!(%status, bytes = text.len(), "api response");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch<T: DeserializeOwned>(&self, resource: &str, params: &QueryParams) -> ApiResult<T> {
        let value = self.resource(resource)?.query(params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn put<T: DeserializeOwned>(&self, resource: &str, body: &Value) -> ApiResult<T> {
        let value = self.resource(resource)?.update(None, body).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// The five conventional operations on one endpoint. Each call issues a new request.
#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    api: &'a HttpApi,
    spec: &'a EndpointSpec,
}

impl<'a> Resource<'a> {
    pub fn spec(&self) -> &EndpointSpec {
        self.spec
    }

    /// Single object (or singleton endpoint).
    pub async fn get(&self, id: Option<&str>, params: &QueryParams) -> ApiResult<Value> {
        self.api.execute(self.spec, Method::GET, id, params, None).await
    }

    /// Collection, usually a `{items, total}` page.
    pub async fn query(&self, params: &QueryParams) -> ApiResult<Value> {
        self.api
            .execute(self.spec, Method::GET, None, params, None)
            .await
    }

    pub async fn patch(&self, id: &str, body: &Value) -> ApiResult<Value> {
        self.api
            .execute(self.spec, Method::PATCH, Some(id), &QueryParams::new(), Some(body))
            .await
    }

    pub async fn update(&self, id: Option<&str>, body: &Value) -> ApiResult<Value> {
        self.api
            .execute(self.spec, Method::PUT, id, &QueryParams::new(), Some(body))
            .await
    }

    pub async fn delete(&self, id: Option<&str>, params: &QueryParams) -> ApiResult<Value> {
        self.api
            .execute(self.spec, Method::DELETE, id, params, None)
            .await
    }

    pub async fn post(&self, body: &Value) -> ApiResult<Value> {
        self.api
            .execute(self.spec, Method::POST, None, &QueryParams::new(), Some(body))
            .await
    }
}

#[async_trait]
impl CloudMailingApi for HttpApi {
    fn set_authorization(&self, token: Option<&str>) {
        if let Ok(mut guard) = self.authorization.write() {
            *guard = token.map(str::to_string);
        }
    }

    async fn authenticate(&self, username: &str, password: &str) -> ApiResult<User> {
        let body = json!({ "username": username, "password": password });
        let value = self.resource("authenticate")?.post(&body).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn current_user(&self) -> ApiResult<User> {
        let value = self
            .resource("authenticate")?
            .get(None, &QueryParams::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn logout(&self) -> ApiResult<()> {
        self.resource("logout")?.post(&json!({})).await?;
        Ok(())
    }

    async fn query_mailings(&self, params: &QueryParams) -> ApiResult<Page<Mailing>> {
        self.fetch("mailings", params).await
    }

    async fn get_mailing(&self, id: i64) -> ApiResult<Mailing> {
        let value = self
            .resource("mailings")?
            .get(Some(&id.to_string()), &QueryParams::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn patch_mailing(&self, id: i64, body: &Value) -> ApiResult<Mailing> {
        let value = self
            .resource("mailings")?
            .patch(&id.to_string(), body)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn delete_mailing(&self, id: i64) -> ApiResult<()> {
        self.resource("mailings")?
            .delete(Some(&id.to_string()), &QueryParams::new())
            .await?;
        Ok(())
    }

    async fn query_recipients(&self, params: &QueryParams) -> ApiResult<Page<Recipient>> {
        self.fetch("recipients", params).await
    }

    async fn count(&self, what: Counted) -> ApiResult<Count> {
        let params = QueryParams::new().with(".filter", crate::table::FILTER_TOTAL);
        self.fetch(what.resource(), &params).await
    }

    async fn cm_info(&self) -> ApiResult<CmInfo> {
        self.fetch("cm", &QueryParams::new()).await
    }

    async fn satellites(&self) -> ApiResult<Page<Satellite>> {
        self.fetch("satellites", &QueryParams::new()).await
    }

    async fn cpu(&self) -> ApiResult<CpuStats> {
        self.fetch("cpu", &QueryParams::new()).await
    }

    async fn memory(&self) -> ApiResult<MemoryStats> {
        self.fetch("memory", &QueryParams::new()).await
    }

    async fn disk(&self) -> ApiResult<DiskStats> {
        self.fetch("disk", &QueryParams::new()).await
    }

    async fn hourly_stats(&self, params: &QueryParams) -> ApiResult<Page<HourlyStat>> {
        self.fetch("hourlyStats", params).await
    }

    async fn network(&self) -> ApiResult<NetworkConfig> {
        self.fetch("fw_network", &QueryParams::new()).await
    }

    async fn update_network(&self, config: &NetworkConfig) -> ApiResult<NetworkConfig> {
        self.put("fw_network", &serde_json::to_value(config)?).await
    }

    async fn time_settings(&self) -> ApiResult<TimeSettings> {
        self.fetch("fw_time", &QueryParams::new()).await
    }

    async fn update_time_settings(&self, settings: &TimeSettings) -> ApiResult<TimeSettings> {
        self.put("fw_time", &serde_json::to_value(settings)?).await
    }

    async fn all_timezones(&self) -> ApiResult<Vec<String>> {
        self.fetch("fw_all_tz", &QueryParams::new()).await
    }
}
