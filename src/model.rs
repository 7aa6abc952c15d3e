use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MailingStatus {
    FillingRecipients,
    Ready,
    Running,
    Paused,
    Finished,
}

impl MailingStatus {
    /// Statuses listed in the "active mailings" table.
    pub const ACTIVE: [MailingStatus; 4] = [
        MailingStatus::FillingRecipients,
        MailingStatus::Ready,
        MailingStatus::Running,
        MailingStatus::Paused,
    ];
    pub const FINISHED: [MailingStatus; 1] = [MailingStatus::Finished];

    pub fn as_str(&self) -> &'static str {
        match self {
            MailingStatus::FillingRecipients => "FILLING_RECIPIENTS",
            MailingStatus::Ready => "READY",
            MailingStatus::Running => "RUNNING",
            MailingStatus::Paused => "PAUSED",
            MailingStatus::Finished => "FINISHED",
        }
    }
}

impl std::fmt::Display for MailingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientStatus {
    Ready,
    InProgress,
    Warning,
    Finished,
    Error,
    Timeout,
    GeneralError,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Ready => "READY",
            RecipientStatus::InProgress => "IN_PROGRESS",
            RecipientStatus::Warning => "WARNING",
            RecipientStatus::Finished => "FINISHED",
            RecipientStatus::Error => "ERROR",
            RecipientStatus::Timeout => "TIMEOUT",
            RecipientStatus::GeneralError => "GENERAL_ERROR",
        }
    }

    /// Display class used when rendering a recipients table row.
    pub fn css_class(&self) -> &'static str {
        match self {
            RecipientStatus::Ready | RecipientStatus::InProgress => "",
            RecipientStatus::Warning | RecipientStatus::Timeout => "softbounce",
            RecipientStatus::Finished => "delivered",
            RecipientStatus::Error | RecipientStatus::GeneralError => "hardbounce",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mailing {
    pub id: i64,
    pub status: MailingStatus,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub read_tracking: bool,
    #[serde(default)]
    pub click_tracking: bool,
    #[serde(default)]
    pub testing: bool,
    #[serde(default)]
    pub backup_customized_emails: bool,
    #[serde(default, deserialize_with = "de_opt_datetime", skip_serializing_if = "Option::is_none")]
    pub submit_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_datetime", skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_datetime", skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<DateTime<Utc>>,
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_duration: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_datetime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_datetime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_recipient: i64,
    #[serde(default)]
    pub total_sent: i64,
    #[serde(default)]
    pub total_pending: i64,
    #[serde(default)]
    pub total_error: i64,
    #[serde(default)]
    pub total_softbounce: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mailing {
    /// A paused mailing that already sent something resumes instead of restarting.
    pub fn has_started(&self) -> bool {
        self.start_time.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub id: String,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub send_status: RecipientStatus,
    #[serde(default)]
    pub reply_code: Option<i64>,
    #[serde(default)]
    pub reply_enhanced_code: Option<String>,
    #[serde(default)]
    pub reply_text: Option<String>,
    #[serde(default)]
    pub try_count: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub first_try: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub next_try: Option<DateTime<Utc>>,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Paginated response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: None,
        }
    }
}

/// Response to a `.filter=total` query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Count {
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CpuStats {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DiskStats {
    #[serde(default)]
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyStat {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub date: Option<DateTime<Utc>>,
    pub epoch_hour: i64,
    #[serde(default)]
    pub sent: i64,
    #[serde(default)]
    pub failed: i64,
    #[serde(default)]
    pub tries: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Satellite {
    pub id: i64,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub paired: bool,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub date_paired: Option<DateTime<Utc>>,
    #[serde(default)]
    pub domain_affinity: Option<Value>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identity of the master the console talks to (`GET /api`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CmInfo {
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EthMode {
    Dhcp,
    Static,
    Up,
    Disabled,
}

impl EthMode {
    pub const ALL: [EthMode; 4] = [EthMode::Dhcp, EthMode::Static, EthMode::Up, EthMode::Disabled];

    pub fn label(&self) -> &'static str {
        match self {
            EthMode::Dhcp => "Using DHCP",
            EthMode::Static => "Manually",
            EthMode::Up => "Bridged",
            EthMode::Disabled => "Disabled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterface {
    #[serde(default)]
    pub id: Option<Value>,
    pub name: String,
    pub mode: EthMode,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bridge {
    pub mode: EthMode,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub intf_list: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub bridge: Bridge,
    #[serde(default, rename = "default-gateway")]
    pub default_gateway: Option<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<NetworkInterface>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSettings {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub use_ntp: bool,
    #[serde(default)]
    pub current_datetime: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The master emits naive ISO timestamps; accept those as UTC along with RFC 3339.
fn de_opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
