//! Dashboard widgets. Each one keeps a view model that its own poller refreshes.
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument};

use crate::api::{CloudMailingApi, Counted, QueryParams};
use crate::config::Polling;
use crate::error::ApiResult;
use crate::model::{CpuStats, DiskStats, HourlyStat, Mailing, MemoryStats, Page};
use crate::poller::{self, PollHandle};
use crate::table::FILTER_DEFAULT_WITH_TOTAL;

/// Shared view model of a widget.
pub type View<V> = Arc<RwLock<V>>;

fn read<V: Clone>(view: &View<V>) -> V {
    let guard = view.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    (*guard).clone()
}

fn write<V>(view: &View<V>, f: impl FnOnce(&mut V)) {
    let mut guard = view.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut *guard);
}

// ---- summary counters -------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryView {
    pub mailings: Option<u64>,
    pub recipients: Option<u64>,
    pub satellites: Option<u64>,
    /// Last page reported by the active-mailings widget.
    pub running: Option<Page<Mailing>>,
}

/// Fetch the three totals together; each successful count is kept even if
/// another one failed.
#[instrument(skip_all)]
pub async fn refresh_summary(api: &dyn CloudMailingApi, view: &View<SummaryView>) -> ApiResult<()> {
    let (mailings, recipients, satellites) = futures::join!(
        api.count(Counted::Mailings),
        api.count(Counted::Recipients),
        api.count(Counted::Satellites)
    );
    write(view, |v| {
        if let Ok(c) = &mailings {
            v.mailings = Some(c.total);
        }
        if let Ok(c) = &recipients {
            v.recipients = Some(c.total);
        }
        if let Ok(c) = &satellites {
            v.satellites = Some(c.total);
        }
    });
    mailings?;
    recipients?;
    satellites?;
    Ok(())
}

// ---- running mailings -------------------------------------------------

pub type MailingsListener = Arc<dyn Fn(&Page<Mailing>) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveMailingsView {
    pub mailings: Option<Page<Mailing>>,
}

pub fn running_mailings_query() -> QueryParams {
    let mut params = QueryParams::new();
    params
        .set_all("status", ["RUNNING"])
        .set(".filter", FILTER_DEFAULT_WITH_TOTAL)
        .set(".sort", "-start_time");
    params
}

pub async fn refresh_active_mailings(
    api: &dyn CloudMailingApi,
    view: &View<ActiveMailingsView>,
    listener: Option<&MailingsListener>,
) -> ApiResult<()> {
    let page = api.query_mailings(&running_mailings_query()).await?;
    if let Some(listener) = listener {
        listener(&page);
    }
    write(view, |v| v.mailings = Some(page));
    Ok(())
}

// ---- hourly graphics --------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: &'static str,
    /// `(epoch_hour, value)`
    pub values: Vec<(i64, i64)>,
}

impl Series {
    fn new(key: &'static str) -> Self {
        Self {
            key,
            values: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyView {
    /// Hours between now and the end of the window; never positive.
    pub offset: i64,
    /// Window width in hours.
    pub slice: i64,
    pub tries: Series,
    pub sent: Series,
    pub failed: Series,
}

impl Default for HourlyView {
    fn default() -> Self {
        Self {
            offset: 0,
            slice: 24,
            tries: Series::new("Tries"),
            sent: Series::new("Sent"),
            failed: Series::new("Failed"),
        }
    }
}

impl HourlyView {
    pub fn prev(&mut self) {
        self.offset -= self.slice;
    }

    pub fn next(&mut self) {
        self.offset = (self.offset + self.slice).min(0);
    }

    pub fn set_slice(&mut self, hours: i64) {
        self.slice = hours.max(1);
    }

    pub fn fill(&mut self, items: &[HourlyStat]) {
        self.tries.values = items.iter().map(|s| (s.epoch_hour, s.tries)).collect();
        self.sent.values = items.iter().map(|s| (s.epoch_hour, s.sent)).collect();
        self.failed.values = items.iter().map(|s| (s.epoch_hour, s.failed)).collect();
    }
}

fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `from_date = now + offset - slice`; `to_date = now + offset` only when the
/// window does not end now.
pub fn hourly_window(now: DateTime<Utc>, offset: i64, slice: i64) -> QueryParams {
    let mut params = QueryParams::new();
    params.set("from_date", iso(now + ChronoDuration::hours(offset - slice)));
    if offset != 0 {
        params.set("to_date", iso(now + ChronoDuration::hours(offset)));
    }
    params
}

pub async fn refresh_hourly(api: &dyn CloudMailingApi, view: &View<HourlyView>) -> ApiResult<()> {
    let (offset, slice) = {
        let v = read(view);
        (v.offset, v.slice)
    };
    let page = api
        .hourly_stats(&hourly_window(Utc::now(), offset, slice))
        .await?;
    debug!(points = page.items.len(), offset, slice, "hourly stats");
    write(view, |v| v.fill(&page.items));
    Ok(())
}

// ---- system gauges ----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slice {
    pub key: &'static str,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugesView {
    pub cpu: Vec<Slice>,
    pub memory: Vec<Slice>,
    pub disk: Vec<Slice>,
}

pub fn cpu_slices(cpu: &CpuStats) -> Vec<Slice> {
    vec![
        Slice { key: "system", y: cpu.system },
        Slice { key: "user", y: cpu.user },
        Slice { key: "idle", y: cpu.idle },
    ]
}

pub fn memory_slices(memory: &MemoryStats) -> Vec<Slice> {
    vec![
        Slice {
            key: "used",
            y: memory.total.saturating_sub(memory.available) as f64,
        },
        Slice {
            key: "available",
            y: memory.available as f64,
        },
    ]
}

pub fn disk_slices(disk: &DiskStats) -> Vec<Slice> {
    vec![
        Slice { key: "used", y: disk.used as f64 },
        Slice { key: "free", y: disk.free as f64 },
    ]
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

pub fn format_mb(bytes: f64) -> String {
    format!("{:.1} Mb", bytes / (1024.0 * 1024.0))
}

pub fn format_gb(bytes: f64) -> String {
    format!("{:.1} Gb", bytes / (1024.0 * 1024.0 * 1024.0))
}

/// CPU and memory, fetched together.
pub async fn refresh_realtime(api: &dyn CloudMailingApi, view: &View<GaugesView>) -> ApiResult<()> {
    let (cpu, memory) = futures::join!(api.cpu(), api.memory());
    write(view, |v| {
        if let Ok(cpu) = &cpu {
            v.cpu = cpu_slices(cpu);
        }
        if let Ok(memory) = &memory {
            v.memory = memory_slices(memory);
        }
    });
    cpu?;
    memory?;
    Ok(())
}

pub async fn refresh_disk(api: &dyn CloudMailingApi, view: &View<GaugesView>) -> ApiResult<()> {
    let disk = api.disk().await?;
    write(view, |v| v.disk = disk_slices(&disk));
    Ok(())
}

// ---- wiring -----------------------------------------------------------

/// All dashboard widgets with their pollers. Dropping it stops every poller.
pub struct Dashboard {
    pub summary: View<SummaryView>,
    pub active: View<ActiveMailingsView>,
    pub hourly: View<HourlyView>,
    pub gauges: View<GaugesView>,
    handles: Vec<PollHandle>,
}

impl Dashboard {
    pub fn start(api: Arc<dyn CloudMailingApi>, polling: &Polling) -> Self {
        let summary: View<SummaryView> = Arc::default();
        let active: View<ActiveMailingsView> = Arc::default();
        let hourly: View<HourlyView> = Arc::default();
        let gauges: View<GaugesView> = Arc::default();

        let summary_for_listener = Arc::clone(&summary);
        let listener: MailingsListener = Arc::new(move |page: &Page<Mailing>| {
            write(&summary_for_listener, |v| v.running = Some(page.clone()));
        });

        let mut handles = Vec::with_capacity(5);
        {
            let (api, view) = (Arc::clone(&api), Arc::clone(&summary));
            handles.push(poller::spawn(
                "dashboard",
                polling.poll_config(polling.dashboard_seconds),
                move || {
                    let (api, view) = (Arc::clone(&api), Arc::clone(&view));
                    async move { refresh_summary(api.as_ref(), &view).await }
                },
            ));
        }
        {
            let (api, view) = (Arc::clone(&api), Arc::clone(&active));
            handles.push(poller::spawn(
                "active-mailings",
                polling.poll_config(polling.active_mailings_seconds),
                move || {
                    let (api, view, listener) =
                        (Arc::clone(&api), Arc::clone(&view), Arc::clone(&listener));
                    async move { refresh_active_mailings(api.as_ref(), &view, Some(&listener)).await }
                },
            ));
        }
        {
            let (api, view) = (Arc::clone(&api), Arc::clone(&hourly));
            handles.push(poller::spawn(
                "hourly-stats",
                polling.poll_config(polling.hourly_stats_seconds),
                move || {
                    let (api, view) = (Arc::clone(&api), Arc::clone(&view));
                    async move { refresh_hourly(api.as_ref(), &view).await }
                },
            ));
        }
        {
            let (api, view) = (Arc::clone(&api), Arc::clone(&gauges));
            handles.push(poller::spawn(
                "realtime-gauges",
                polling.poll_config(polling.realtime_seconds),
                move || {
                    let (api, view) = (Arc::clone(&api), Arc::clone(&view));
                    async move { refresh_realtime(api.as_ref(), &view).await }
                },
            ));
        }
        {
            let (api, view) = (Arc::clone(&api), Arc::clone(&gauges));
            handles.push(poller::spawn(
                "disk-gauge",
                polling.poll_config(polling.disk_seconds),
                move || {
                    let (api, view) = (Arc::clone(&api), Arc::clone(&view));
                    async move { refresh_disk(api.as_ref(), &view).await }
                },
            ));
        }

        Self {
            summary,
            active,
            hourly,
            gauges,
            handles,
        }
    }

    pub fn summary(&self) -> SummaryView {
        read(&self.summary)
    }

    pub fn active(&self) -> ActiveMailingsView {
        read(&self.active)
    }

    pub fn hourly(&self) -> HourlyView {
        read(&self.hourly)
    }

    pub fn gauges(&self) -> GaugesView {
        read(&self.gauges)
    }

    pub fn handles(&self) -> &[PollHandle] {
        &self.handles
    }

    /// Move the hourly window and fetch it immediately.
    pub fn hourly_prev(&self) {
        write(&self.hourly, HourlyView::prev);
        self.refresh("hourly-stats");
    }

    pub fn hourly_next(&self) {
        write(&self.hourly, HourlyView::next);
        self.refresh("hourly-stats");
    }

    /// Resize the hourly window and fetch it immediately.
    pub fn hourly_slice(&self, hours: i64) {
        write(&self.hourly, |v| v.set_slice(hours));
        self.refresh("hourly-stats");
    }

    fn refresh(&self, name: &str) {
        if let Some(handle) = self.handles.iter().find(|h| h.name() == name) {
            handle.refresh_now();
        }
    }

    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.cancel();
        }
        for handle in self.handles {
            handle.shutdown().await;
        }
    }
}
