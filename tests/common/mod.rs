#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use cm_admin::api::{CloudMailingApi, Counted, QueryParams};
use cm_admin::error::{ApiError, ApiResult};
use cm_admin::model::{
    CmInfo, Count, CpuStats, DiskStats, HourlyStat, Mailing, MemoryStats, NetworkConfig, Page,
    Recipient, Satellite, TimeSettings, User,
};

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16, &'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub id: Option<i64>,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn params_named(&self, key: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Answers each operation from a queue. The last queued reply of an
/// operation is repeated for every later call.
#[derive(Debug, Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    authorization: Mutex<Option<String>>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, op: &'static str, reply: Reply) -> Self {
        self.push(op, reply);
        self
    }

    pub fn ok(self, op: &'static str, body: Value) -> Self {
        self.reply(op, Reply::Json(body))
    }

    pub fn fail(self, op: &'static str, status: u16, body: &'static str) -> Self {
        self.reply(op, Reply::Status(status, body))
    }

    pub fn push(&self, op: &'static str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }

    fn answer<T: DeserializeOwned>(
        &self,
        op: &'static str,
        id: Option<i64>,
        params: Option<&QueryParams>,
        body: Option<Value>,
    ) -> ApiResult<T> {
        self.calls.lock().unwrap().push(Call {
            op,
            id,
            params: params.map(|p| p.pairs().to_vec()).unwrap_or_default(),
            body,
        });
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(op) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Json(value)) => Ok(serde_json::from_value(value)?),
            Some(Reply::Status(status, body)) => Err(ApiError::from_status(
                StatusCode::from_u16(status).unwrap(),
                body,
            )),
            None => Err(ApiError::Business {
                status: 500,
                detail: format!("no reply queued for {op}"),
            }),
        }
    }
}

#[async_trait]
impl CloudMailingApi for RecordingApi {
    fn set_authorization(&self, token: Option<&str>) {
        *self.authorization.lock().unwrap() = token.map(str::to_string);
    }

    async fn authenticate(&self, username: &str, password: &str) -> ApiResult<User> {
        let body = json!({"username": username, "password": password});
        self.answer("authenticate", None, None, Some(body))
    }

    async fn current_user(&self) -> ApiResult<User> {
        self.answer("current_user", None, None, None)
    }

    async fn logout(&self) -> ApiResult<()> {
        self.answer::<Value>("logout", None, None, None).map(|_| ())
    }

    async fn query_mailings(&self, params: &QueryParams) -> ApiResult<Page<Mailing>> {
        self.answer("query_mailings", None, Some(params), None)
    }

    async fn get_mailing(&self, id: i64) -> ApiResult<Mailing> {
        self.answer("get_mailing", Some(id), None, None)
    }

    async fn patch_mailing(&self, id: i64, body: &Value) -> ApiResult<Mailing> {
        self.answer("patch_mailing", Some(id), None, Some(body.clone()))
    }

    async fn delete_mailing(&self, id: i64) -> ApiResult<()> {
        self.answer::<Value>("delete_mailing", Some(id), None, None)
            .map(|_| ())
    }

    async fn query_recipients(&self, params: &QueryParams) -> ApiResult<Page<Recipient>> {
        self.answer("query_recipients", None, Some(params), None)
    }

    async fn count(&self, what: Counted) -> ApiResult<Count> {
        let op = match what {
            Counted::Mailings => "count_mailings",
            Counted::Recipients => "count_recipients",
            Counted::Satellites => "count_satellites",
        };
        self.answer(op, None, None, None)
    }

    async fn cm_info(&self) -> ApiResult<CmInfo> {
        self.answer("cm_info", None, None, None)
    }

    async fn satellites(&self) -> ApiResult<Page<Satellite>> {
        self.answer("satellites", None, None, None)
    }

    async fn cpu(&self) -> ApiResult<CpuStats> {
        self.answer("cpu", None, None, None)
    }

    async fn memory(&self) -> ApiResult<MemoryStats> {
        self.answer("memory", None, None, None)
    }

    async fn disk(&self) -> ApiResult<DiskStats> {
        self.answer("disk", None, None, None)
    }

    async fn hourly_stats(&self, params: &QueryParams) -> ApiResult<Page<HourlyStat>> {
        self.answer("hourly_stats", None, Some(params), None)
    }

    async fn network(&self) -> ApiResult<NetworkConfig> {
        self.answer("network", None, None, None)
    }

    async fn update_network(&self, config: &NetworkConfig) -> ApiResult<NetworkConfig> {
        let body = serde_json::to_value(config)?;
        self.answer("update_network", None, None, Some(body))
    }

    async fn time_settings(&self) -> ApiResult<TimeSettings> {
        self.answer("time_settings", None, None, None)
    }

    async fn update_time_settings(&self, settings: &TimeSettings) -> ApiResult<TimeSettings> {
        let body = serde_json::to_value(settings)?;
        self.answer("update_time_settings", None, None, Some(body))
    }

    async fn all_timezones(&self) -> ApiResult<Vec<String>> {
        self.answer("all_timezones", None, None, None)
    }
}

pub fn mailing_json(id: i64, status: &str) -> Value {
    json!({"id": id, "status": status, "subject": format!("mailing {id}")})
}

pub fn user_json(username: &str, is_superuser: bool) -> Value {
    json!({"username": username, "is_superuser": is_superuser})
}
