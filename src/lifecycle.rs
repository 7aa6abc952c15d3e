//! Confirm-then-request mailing transitions with in-place view updates.
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::api::CloudMailingApi;
use crate::confirm::Confirm;
use crate::error::ApiResult;
use crate::model::{Mailing, MailingStatus, Page};

pub const CONFIRM_TITLE: &str = "Confirmation";
pub const START_MESSAGE: &str = "Do you really want to start this mailing ?";
pub const PAUSE_MESSAGE: &str = "Do you really want to pause this mailing ?";
pub const STOP_MESSAGE: &str = "Do you really want to terminate this mailing ?";
pub const DELETE_MESSAGE: &str =
    "Do you really want to delete this mailing ? All its data will be lost!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Cancelled,
}

/// Status requested when starting: resume a paused mailing that already ran,
/// otherwise queue it.
pub fn start_target(mailing: &Mailing) -> MailingStatus {
    if mailing.status == MailingStatus::Paused && mailing.has_started() {
        MailingStatus::Running
    } else {
        MailingStatus::Ready
    }
}

pub struct MailingService {
    api: Arc<dyn CloudMailingApi>,
    confirm: Arc<dyn Confirm>,
}

impl MailingService {
    pub fn new(api: Arc<dyn CloudMailingApi>, confirm: Arc<dyn Confirm>) -> Self {
        Self { api, confirm }
    }

    pub async fn start(&self, mailing: &mut Mailing) -> ApiResult<Outcome> {
        let target = start_target(mailing);
        self.transition(mailing, START_MESSAGE, target).await
    }

    pub async fn pause(&self, mailing: &mut Mailing) -> ApiResult<Outcome> {
        self.transition(mailing, PAUSE_MESSAGE, MailingStatus::Paused)
            .await
    }

    pub async fn stop(&self, mailing: &mut Mailing) -> ApiResult<Outcome> {
        self.transition(mailing, STOP_MESSAGE, MailingStatus::Finished)
            .await
    }

    /// Delete on the server; the caller removes it from its own lists.
    #[instrument(skip_all, fields(id = mailing.id))]
    pub async fn delete(&self, mailing: &Mailing) -> ApiResult<Outcome> {
        if !self.confirm.confirm(CONFIRM_TITLE, DELETE_MESSAGE).await {
            debug!("delete dismissed");
            return Ok(Outcome::Cancelled);
        }
        self.api.delete_mailing(mailing.id).await?;
        info!("mailing deleted");
        Ok(Outcome::Applied)
    }

    /// Delete and drop the mailing from whichever list holds it.
    pub async fn delete_from(&self, lists: &mut MailingLists, id: i64) -> ApiResult<Outcome> {
        let Some(mailing) = lists.find(id).cloned() else {
            return Ok(Outcome::Cancelled);
        };
        let outcome = self.delete(&mailing).await?;
        if outcome == Outcome::Applied {
            lists.remove(id);
        }
        Ok(outcome)
    }

    #[instrument(skip_all, fields(id = mailing.id, target = %target))]
    async fn transition(
        &self,
        mailing: &mut Mailing,
        message: &str,
        target: MailingStatus,
    ) -> ApiResult<Outcome> {
        if !self.confirm.confirm(CONFIRM_TITLE, message).await {
            debug!("transition dismissed");
            return Ok(Outcome::Cancelled);
        }
        let updated = self
            .api
            .patch_mailing(mailing.id, &json!({ "status": target }))
            .await?;
        // the server decides the resulting status
        mailing.status = updated.status;
        info!(status = %mailing.status, "mailing status updated");
        Ok(Outcome::Applied)
    }
}

/// The active and finished tables of the mailings screen.
#[derive(Debug, Clone, Default)]
pub struct MailingLists {
    pub active: Option<Page<Mailing>>,
    pub finished: Option<Page<Mailing>>,
}

impl MailingLists {
    pub fn find(&self, id: i64) -> Option<&Mailing> {
        self.pages()
            .flat_map(|page| page.items.iter())
            .find(|m| m.id == id)
    }

    pub fn find_mut(&mut self, id: i64) -> Option<&mut Mailing> {
        [self.active.as_mut(), self.finished.as_mut()]
            .into_iter()
            .flatten()
            .flat_map(|page| page.items.iter_mut())
            .find(|m| m.id == id)
    }

    /// Remove from the list that contains it; `false` when neither does.
    pub fn remove(&mut self, id: i64) -> bool {
        for page in [self.active.as_mut(), self.finished.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Some(pos) = page.items.iter().position(|m| m.id == id) {
                page.items.remove(pos);
                if let Some(total) = page.total.as_mut() {
                    *total = total.saturating_sub(1);
                }
                return true;
            }
        }
        false
    }

    fn pages(&self) -> impl Iterator<Item = &Page<Mailing>> {
        [self.active.as_ref(), self.finished.as_ref()]
            .into_iter()
            .flatten()
    }
}
