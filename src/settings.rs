//! Network, date/time and satellites settings pages.
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::alert::Notifier;
use crate::api::CloudMailingApi;
use crate::error::{ApiError, ApiResult};
use crate::model::{CmInfo, EthMode, NetworkConfig, Page, Satellite, TimeSettings};

pub const NETWORK_SAVED: &str = "Network configuration has been successfully updated.";
pub const NETWORK_FAILED: &str = "There are some errors.";
pub const TIME_TITLE: &str = "Date & Timezone";
pub const TIME_SAVED: &str = "Settings successfully saved.";
pub const TIME_FAILED: &str = "Failed to save settings:";

/// Selectable interface modes with their labels.
pub fn eth_mode_labels() -> Vec<(EthMode, &'static str)> {
    EthMode::ALL.iter().map(|mode| (*mode, mode.label())).collect()
}

/// Interfaces in `up` mode are the members of the bridge.
pub fn bridged_interfaces(config: &NetworkConfig) -> Vec<String> {
    config
        .interfaces
        .iter()
        .filter(|intf| intf.mode == EthMode::Up)
        .map(|intf| intf.name.clone())
        .collect()
}

fn failure_detail(err: &ApiError) -> String {
    err.detail()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

pub struct NetworkSettings {
    api: Arc<dyn CloudMailingApi>,
    notifier: Arc<dyn Notifier>,
    pub model: NetworkConfig,
}

impl NetworkSettings {
    pub async fn load(api: Arc<dyn CloudMailingApi>, notifier: Arc<dyn Notifier>) -> ApiResult<Self> {
        let model = api.network().await?;
        debug!(interfaces = model.interfaces.len(), "network configuration loaded");
        Ok(Self { api, notifier, model })
    }

    #[instrument(skip_all)]
    pub async fn submit(&mut self) -> ApiResult<()> {
        self.model.bridge.intf_list = bridged_interfaces(&self.model);
        match self.api.update_network(&self.model).await {
            Ok(updated) => {
                info!(bridged = ?self.model.bridge.intf_list, "network configuration updated");
                self.model = updated;
                self.notifier.success(NETWORK_SAVED, None);
                Ok(())
            }
            Err(err) => {
                self.notifier.error(NETWORK_FAILED, None);
                Err(err)
            }
        }
    }
}

pub struct TimeSettingsPage {
    api: Arc<dyn CloudMailingApi>,
    notifier: Arc<dyn Notifier>,
    pub model: TimeSettings,
    timezones: Vec<String>,
}

impl TimeSettingsPage {
    pub async fn load(api: Arc<dyn CloudMailingApi>, notifier: Arc<dyn Notifier>) -> ApiResult<Self> {
        let (model, timezones) = futures::try_join!(api.time_settings(), api.all_timezones())?;
        Ok(Self {
            api,
            notifier,
            model,
            timezones,
        })
    }

    /// Options of the timezone selector.
    pub fn timezones(&self) -> &[String] {
        &self.timezones
    }

    #[instrument(skip_all)]
    pub async fn submit(&mut self) -> ApiResult<()> {
        match self.api.update_time_settings(&self.model).await {
            Ok(updated) => {
                self.model = updated;
                self.notifier.success(TIME_SAVED, Some(TIME_TITLE));
                Ok(())
            }
            Err(err) => {
                self.notifier.error(
                    &format!("{TIME_FAILED} {}", failure_detail(&err)),
                    Some(TIME_TITLE),
                );
                Err(err)
            }
        }
    }
}

/// Master identity plus the paired satellites.
#[derive(Debug, Clone)]
pub struct SatellitesPage {
    pub cm: CmInfo,
    pub satellites: Page<Satellite>,
}

impl SatellitesPage {
    pub async fn load(api: &dyn CloudMailingApi) -> ApiResult<Self> {
        let (cm, satellites) = futures::try_join!(api.cm_info(), api.satellites())?;
        Ok(Self { cm, satellites })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn up_interfaces_join_the_bridge() {
        let config: NetworkConfig = serde_json::from_value(json!({
            "bridge": {"mode": "dhcp", "intf_list": ["stale"]},
            "default-gateway": "10.0.0.1",
            "dns": ["1.1.1.1"],
            "interfaces": [
                {"id": 1, "name": "eth0", "mode": "up"},
                {"id": 2, "name": "eth1", "mode": "static", "ip": "10.0.0.2", "mask": "255.0.0.0"},
                {"id": 3, "name": "eth2", "mode": "up"},
                {"id": 4, "name": "eth3", "mode": "disabled"}
            ]
        }))
        .unwrap();
        assert_eq!(bridged_interfaces(&config), vec!["eth0", "eth2"]);
    }

    #[test]
    fn mode_labels() {
        let labels = eth_mode_labels();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[0], (EthMode::Dhcp, "Using DHCP"));
        assert_eq!(labels[2], (EthMode::Up, "Bridged"));
    }
}
