//! Mailings screen (active and finished tables) and the single-mailing view.
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::alert::Notifier;
use crate::api::{CloudMailingApi, QueryParams};
use crate::confirm::Confirm;
use crate::error::ApiResult;
use crate::lifecycle::{MailingLists, MailingService, Outcome};
use crate::model::{Mailing, MailingStatus, Page, Recipient};
use crate::table::{self, TableState};

pub const SAVE_SUCCESS: &str = "Mailing successfully saved!";
pub const SAVE_ERROR: &str = "Error saving mailing:";

/// Query for one page of mailings restricted to `statuses`. A `status`
/// search term replaces the restriction.
pub fn mailings_query(
    state: &TableState,
    statuses: &[MailingStatus],
    default_limit: u64,
) -> QueryParams {
    let mut params = table::to_query(state, default_limit);
    if params.get("status").is_none() {
        params.set_all("status", statuses.iter().map(MailingStatus::as_str));
    }
    params
}

/// Query for one page of a mailing's recipients. The `mailing` scope always
/// wins over a search term of the same name.
pub fn recipients_query(mailing_id: i64, state: &TableState, default_limit: u64) -> QueryParams {
    let mut params = table::to_query(state, default_limit);
    params.set("mailing", mailing_id);
    params
}

pub struct MailingsView {
    api: Arc<dyn CloudMailingApi>,
    service: MailingService,
    per_page: u64,
    lists: MailingLists,
}

impl MailingsView {
    pub fn new(api: Arc<dyn CloudMailingApi>, confirm: Arc<dyn Confirm>, per_page: u64) -> Self {
        Self {
            service: MailingService::new(Arc::clone(&api), confirm),
            api,
            per_page,
            lists: MailingLists::default(),
        }
    }

    pub fn lists(&self) -> &MailingLists {
        &self.lists
    }

    pub async fn get_active_mailings(&mut self, state: &mut TableState) -> ApiResult<&Page<Mailing>> {
        let page = self.fetch(state, &MailingStatus::ACTIVE).await?;
        Ok(&*self.lists.active.insert(page))
    }

    pub async fn get_finished_mailings(
        &mut self,
        state: &mut TableState,
    ) -> ApiResult<&Page<Mailing>> {
        let page = self.fetch(state, &MailingStatus::FINISHED).await?;
        Ok(&*self.lists.finished.insert(page))
    }

    #[instrument(skip_all, fields(statuses = statuses.len()))]
    async fn fetch(
        &self,
        state: &mut TableState,
        statuses: &[MailingStatus],
    ) -> ApiResult<Page<Mailing>> {
        let limit = state.limit(self.per_page);
        let params = mailings_query(state, statuses, self.per_page);
        let page = self.api.query_mailings(&params).await?;
        table::apply_total(state, page.total.unwrap_or(0), limit);
        debug!(items = page.items.len(), total = ?page.total, "mailings page loaded");
        Ok(page)
    }

    pub async fn start(&mut self, id: i64) -> ApiResult<Outcome> {
        match self.lists.find_mut(id) {
            Some(mailing) => self.service.start(mailing).await,
            None => Ok(not_listed(id)),
        }
    }

    pub async fn pause(&mut self, id: i64) -> ApiResult<Outcome> {
        match self.lists.find_mut(id) {
            Some(mailing) => self.service.pause(mailing).await,
            None => Ok(not_listed(id)),
        }
    }

    pub async fn stop(&mut self, id: i64) -> ApiResult<Outcome> {
        match self.lists.find_mut(id) {
            Some(mailing) => self.service.stop(mailing).await,
            None => Ok(not_listed(id)),
        }
    }

    pub async fn delete(&mut self, id: i64) -> ApiResult<Outcome> {
        if self.lists.find(id).is_none() {
            return Ok(not_listed(id));
        }
        self.service.delete_from(&mut self.lists, id).await
    }
}

fn not_listed(id: i64) -> Outcome {
    warn!(id, "mailing is not in any loaded list");
    Outcome::Cancelled
}

/// One mailing with its recipients table and edit form.
pub struct MailingDetails {
    api: Arc<dyn CloudMailingApi>,
    service: MailingService,
    notifier: Arc<dyn Notifier>,
    per_page: u64,
    mailing: Mailing,
    recipients: Option<Page<Recipient>>,
    tab: Option<String>,
}

impl MailingDetails {
    #[instrument(skip(api, confirm, notifier))]
    pub async fn load(
        api: Arc<dyn CloudMailingApi>,
        confirm: Arc<dyn Confirm>,
        notifier: Arc<dyn Notifier>,
        id: i64,
        per_page: u64,
    ) -> ApiResult<Self> {
        let mailing = api.get_mailing(id).await?;
        Ok(Self {
            service: MailingService::new(Arc::clone(&api), confirm),
            api,
            notifier,
            per_page,
            mailing,
            recipients: None,
            tab: None,
        })
    }

    pub fn mailing(&self) -> &Mailing {
        &self.mailing
    }

    pub fn recipients(&self) -> Option<&Page<Recipient>> {
        self.recipients.as_ref()
    }

    pub fn tab(&self) -> Option<&str> {
        self.tab.as_deref()
    }

    pub fn select_tab(&mut self, name: impl Into<String>) {
        self.tab = Some(name.into());
    }

    pub async fn get_recipients(&mut self, state: &mut TableState) -> ApiResult<&Page<Recipient>> {
        let limit = state.limit(self.per_page);
        let params = recipients_query(self.mailing.id, state, self.per_page);
        let page = self.api.query_recipients(&params).await?;
        table::apply_total(state, page.total.unwrap_or(0), limit);
        Ok(&*self.recipients.insert(page))
    }

    /// PATCH the edited fields. The server copy replaces the local one.
    #[instrument(skip_all, fields(id = self.mailing.id, fields = fields.len()))]
    pub async fn save_mailing(&mut self, fields: Map<String, Value>) -> ApiResult<&Mailing> {
        let mut body = Map::new();
        body.insert("charset".into(), Value::from("utf-8"));
        body.extend(fields);
        match self.api.patch_mailing(self.mailing.id, &Value::Object(body)).await {
            Ok(updated) => {
                info!("mailing saved");
                self.notifier.success(SAVE_SUCCESS, None);
                self.mailing = updated;
                Ok(&self.mailing)
            }
            Err(err) => {
                let detail = err
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                self.notifier.error(&format!("{SAVE_ERROR} {detail}"), None);
                Err(err)
            }
        }
    }

    /// Discard local edits.
    pub async fn reset_mailing(&mut self) -> ApiResult<&Mailing> {
        self.mailing = self.api.get_mailing(self.mailing.id).await?;
        Ok(&self.mailing)
    }

    pub async fn start(&mut self) -> ApiResult<Outcome> {
        self.service.start(&mut self.mailing).await
    }

    pub async fn pause(&mut self) -> ApiResult<Outcome> {
        self.service.pause(&mut self.mailing).await
    }

    pub async fn stop(&mut self) -> ApiResult<Outcome> {
        self.service.stop(&mut self.mailing).await
    }

    /// On `Applied` the caller leaves the view.
    pub async fn delete(&self) -> ApiResult<Outcome> {
        self.service.delete(&self.mailing).await
    }
}
