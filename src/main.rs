use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use cm_admin::alert::{Notifier, TracingNotifier};
use cm_admin::api::{CloudMailingApi, HttpApi};
use cm_admin::config;
use cm_admin::confirm::{AutoConfirm, Confirm, StdinConfirm};
use cm_admin::credentials::FileCredentialStore;
use cm_admin::dashboard::{self, Dashboard};
use cm_admin::lifecycle::Outcome;
use cm_admin::mailings::{MailingDetails, MailingsView};
use cm_admin::model::{EthMode, Mailing, Page, Recipient};
use cm_admin::router::{self, Navigation, Route};
use cm_admin::session::{AuthEvents, SessionContext};
use cm_admin::settings::{self, NetworkSettings, SatellitesPage, TimeSettingsPage};
use cm_admin::table::TableState;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Accept every confirmation prompt
    #[arg(long, short = 'y')]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authenticate and remember the credential
    Login {
        #[arg(long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    /// Evaluate the login guard for a console path
    Route { path: String },
    /// List active or finished mailings
    Mailings {
        #[arg(value_enum)]
        list: MailingList,
        #[command(flatten)]
        table: TableArgs,
    },
    /// Show, control or edit one mailing
    Mailing {
        #[arg(value_enum)]
        action: MailingAction,
        id: i64,
        /// Field to save, `key=value` (value parsed as JSON when possible)
        #[arg(long = "set", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
    },
    /// Recipients of a mailing
    Recipients {
        mailing_id: i64,
        #[command(flatten)]
        table: TableArgs,
    },
    /// Run every dashboard widget until Ctrl-C
    Dashboard {
        /// Seconds between snapshots
        #[arg(long, default_value_t = 10)]
        print_every: u64,
        /// Width of the hourly statistics window
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    Settings {
        #[arg(value_enum)]
        page: SettingsPageArg,
        #[command(flatten)]
        edit: SettingsArgs,
    },
    /// Print a sample configuration
    ConfigExample,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MailingList {
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MailingAction {
    Show,
    Start,
    Pause,
    Stop,
    Delete,
    Save,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SettingsPageArg {
    Network,
    Time,
    Satellites,
}

#[derive(Debug, clap::Args)]
struct TableArgs {
    #[arg(long)]
    offset: Option<u64>,
    #[arg(long)]
    limit: Option<u64>,
    /// Sort predicate
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    desc: bool,
    /// Search term, `field=value`
    #[arg(long = "search", value_parser = parse_key_value)]
    search: Vec<(String, String)>,
}

impl TableArgs {
    fn state(&self) -> TableState {
        let mut state = TableState::default();
        state.pagination.start = self.offset;
        state.pagination.number = self.limit;
        if let Some(sort) = &self.sort {
            state = state.sorted_by(sort.clone(), self.desc);
        }
        for (key, value) in &self.search {
            state = state.searching(key.clone(), Value::String(value.clone()));
        }
        state
    }
}

#[derive(Debug, clap::Args)]
struct SettingsArgs {
    /// Send the (edited) page back to the master
    #[arg(long)]
    apply: bool,
    /// Interface mode, `name=dhcp|static|up|disabled`
    #[arg(long = "intf", value_parser = parse_key_value)]
    interfaces: Vec<(String, String)>,
    #[arg(long)]
    gateway: Option<String>,
    #[arg(long)]
    dns: Vec<String>,
    #[arg(long)]
    timezone: Option<String>,
    #[arg(long)]
    ntp: Option<bool>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn json_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

struct App {
    cfg: config::Config,
    api: Arc<dyn CloudMailingApi>,
    notifier: Arc<dyn Notifier>,
    confirm: Arc<dyn Confirm>,
    session: Arc<SessionContext>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ConfigExample = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let events = AuthEvents::new();
    let api: Arc<dyn CloudMailingApi> = Arc::new(HttpApi::from_config(&cfg, events.clone())?);
    let store = Arc::new(FileCredentialStore::new(&cfg.app.data_dir));
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let confirm: Arc<dyn Confirm> = if args.yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(StdinConfirm)
    };
    let session = Arc::new(SessionContext::new(
        Arc::clone(&api),
        store,
        Arc::clone(&notifier),
        events,
    ));
    if session.restore().await? {
        info!("using stored credential");
    }
    let _listener = session.spawn_listener();

    let app = App {
        cfg,
        api,
        notifier,
        confirm,
        session,
    };
    run(&app, args.command).await
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_line("Password: ").await?,
            };
            let user = app.session.login(&username, &password).await?;
            println!("logged in as {}", user.username);
        }
        Command::Logout => {
            app.session.logout().await?;
            println!("logged out");
        }
        Command::Whoami => {
            let user = app.session.current_user().await?;
            let role = if SessionContext::is_admin(&user) { "admin" } else { "user" };
            println!("{} ({role})", user.username);
        }
        Command::Route { path } => {
            let nav = router::guard(Route::parse(&path), &app.session).await;
            let verb = match nav {
                Navigation::Proceed(_) => "proceed",
                Navigation::Redirect(_) => "redirect",
            };
            let route = nav.target();
            println!("{verb} {route} [{}]", route.name());
        }
        Command::Mailings { list, table } => {
            let mut view = MailingsView::new(
                Arc::clone(&app.api),
                Arc::clone(&app.confirm),
                app.cfg.tables.mailings_per_page,
            );
            let mut state = table.state();
            let page = match list {
                MailingList::Active => view.get_active_mailings(&mut state).await?,
                MailingList::Finished => view.get_finished_mailings(&mut state).await?,
            };
            print_mailings(page);
            println!(
                "page count: {}",
                state.pagination.number_of_pages.unwrap_or(0)
            );
        }
        Command::Mailing { action, id, set } => mailing_command(app, action, id, set).await?,
        Command::Recipients { mailing_id, table } => {
            let mut details = MailingDetails::load(
                Arc::clone(&app.api),
                Arc::clone(&app.confirm),
                Arc::clone(&app.notifier),
                mailing_id,
                app.cfg.tables.recipients_per_page,
            )
            .await?;
            let mut state = table.state();
            let page = details.get_recipients(&mut state).await?;
            print_recipients(page);
            println!(
                "page count: {}",
                state.pagination.number_of_pages.unwrap_or(0)
            );
        }
        Command::Dashboard { print_every, hours } => run_dashboard(app, print_every, hours).await?,
        Command::Settings { page, edit } => settings_command(app, page, edit).await?,
        Command::ConfigExample => print!("{}", config::example()),
    }
    Ok(())
}

async fn mailing_command(
    app: &App,
    action: MailingAction,
    id: i64,
    set: Vec<(String, String)>,
) -> Result<()> {
    if action != MailingAction::Save && !set.is_empty() {
        bail!("--set only applies to `mailing save`");
    }
    let mut details = MailingDetails::load(
        Arc::clone(&app.api),
        Arc::clone(&app.confirm),
        Arc::clone(&app.notifier),
        id,
        app.cfg.tables.recipients_per_page,
    )
    .await?;
    let outcome = match action {
        MailingAction::Show => None,
        MailingAction::Start => Some(details.start().await?),
        MailingAction::Pause => Some(details.pause().await?),
        MailingAction::Stop => Some(details.stop().await?),
        MailingAction::Delete => {
            if details.delete().await? == Outcome::Applied {
                println!("mailing {id} deleted");
            }
            return Ok(());
        }
        MailingAction::Save => {
            if set.is_empty() {
                bail!("nothing to save, use --set key=value");
            }
            let fields: Map<String, Value> = set
                .iter()
                .map(|(key, value)| (key.clone(), json_value(value)))
                .collect();
            details.save_mailing(fields).await?;
            None
        }
    };
    if outcome == Some(Outcome::Cancelled) {
        println!("cancelled");
    }
    print_mailing_details(details.mailing());
    Ok(())
}

async fn run_dashboard(app: &App, print_every: u64, hours: i64) -> Result<()> {
    let board = Dashboard::start(Arc::clone(&app.api), &app.cfg.polling);
    if hours != 24 {
        board.hourly_slice(hours);
    }
    let mut ticker = tokio::time::interval(Duration::from_secs(print_every.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => print_dashboard(&board),
        }
    }
    info!("stopping dashboard");
    board.shutdown().await;
    Ok(())
}

async fn settings_command(app: &App, page: SettingsPageArg, edit: SettingsArgs) -> Result<()> {
    match page {
        SettingsPageArg::Network => {
            let mut net = NetworkSettings::load(Arc::clone(&app.api), Arc::clone(&app.notifier)).await?;
            for (name, mode) in &edit.interfaces {
                let mode: EthMode = serde_json::from_value(Value::String(mode.clone()))
                    .with_context(|| format!("unknown interface mode `{mode}`"))?;
                let intf = net
                    .model
                    .interfaces
                    .iter_mut()
                    .find(|intf| intf.name == *name)
                    .ok_or_else(|| anyhow!("no interface named `{name}`"))?;
                intf.mode = mode;
            }
            if let Some(gateway) = edit.gateway {
                net.model.default_gateway = Some(gateway);
            }
            if !edit.dns.is_empty() {
                net.model.dns = edit.dns;
            }
            if edit.apply {
                net.submit().await?;
            }
            println!("bridge: {:?} {:?}", net.model.bridge.mode, net.model.bridge.intf_list);
            println!("gateway: {}", net.model.default_gateway.as_deref().unwrap_or("-"));
            println!("dns: {}", net.model.dns.join(", "));
            for intf in &net.model.interfaces {
                println!(
                    "  {:<8} {:<12} {} {}",
                    intf.name,
                    intf.mode.label(),
                    intf.ip.as_deref().unwrap_or("-"),
                    intf.mask.as_deref().unwrap_or("")
                );
            }
            let modes: Vec<&str> = settings::eth_mode_labels().into_iter().map(|(_, l)| l).collect();
            println!("modes: {}", modes.join(" / "));
        }
        SettingsPageArg::Time => {
            let mut time = TimeSettingsPage::load(Arc::clone(&app.api), Arc::clone(&app.notifier)).await?;
            if let Some(tz) = edit.timezone {
                if !time.timezones().iter().any(|known| *known == tz) {
                    bail!("unknown timezone `{tz}`");
                }
                time.model.timezone = Some(tz);
            }
            if let Some(ntp) = edit.ntp {
                time.model.use_ntp = ntp;
            }
            if edit.apply {
                time.submit().await?;
            }
            println!("timezone: {}", time.model.timezone.as_deref().unwrap_or("-"));
            println!("use ntp: {}", time.model.use_ntp);
            println!(
                "current: {}",
                time.model.current_datetime.as_deref().unwrap_or("-")
            );
            println!("{} timezones available", time.timezones().len());
        }
        SettingsPageArg::Satellites => {
            let page = SatellitesPage::load(app.api.as_ref()).await?;
            println!(
                "master {} version {}",
                page.cm.serial.as_deref().unwrap_or("-"),
                page.cm.version.as_deref().unwrap_or("-")
            );
            for sat in &page.satellites.items {
                println!(
                    "{:>4}  {:<20} enabled={} paired={} group={}",
                    sat.id,
                    sat.serial.as_deref().unwrap_or("-"),
                    sat.enabled,
                    sat.paired,
                    sat.group.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

async fn read_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_mailings(page: &Page<Mailing>) {
    for m in &page.items {
        println!(
            "{:>6}  {:<18}  {:>6}/{:<6}  {}",
            m.id,
            m.status,
            m.total_sent,
            m.total_recipient,
            m.subject.as_deref().unwrap_or("")
        );
    }
    println!("{} of {} mailings", page.items.len(), page.total.unwrap_or(0));
}

fn print_mailing_details(m: &Mailing) {
    println!("mailing {} [{}]", m.id, m.status);
    println!("  subject: {}", m.subject.as_deref().unwrap_or(""));
    println!(
        "  from: {} <{}>",
        m.sender_name.as_deref().unwrap_or(""),
        m.mail_from.as_deref().unwrap_or("")
    );
    if let Some(start) = m.scheduled_start {
        println!("  scheduled start: {start}");
    }
    if let Some(started) = m.start_time {
        println!("  started: {started}");
    }
    println!(
        "  recipients: {} sent, {} pending, {} errors, {} soft bounces, {} total",
        m.total_sent, m.total_pending, m.total_error, m.total_softbounce, m.total_recipient
    );
}

fn print_recipients(page: &Page<Recipient>) {
    for r in &page.items {
        println!(
            "{:<40}  {:<14} {:<10}  {}",
            r.email.as_deref().unwrap_or(&r.id),
            r.send_status.as_str(),
            r.send_status.css_class(),
            r.reply_text.as_deref().unwrap_or("")
        );
    }
    println!("{} of {} recipients", page.items.len(), page.total.unwrap_or(0));
}

fn print_dashboard(board: &Dashboard) {
    let summary = board.summary();
    let show = |n: Option<u64>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
    println!(
        "mailings {} | recipients {} | satellites {}",
        show(summary.mailings),
        show(summary.recipients),
        show(summary.satellites)
    );
    if let Some(page) = board.active().mailings {
        for m in &page.items {
            println!("  running {:>6} {}", m.id, m.subject.as_deref().unwrap_or(""));
        }
    }
    let hourly = board.hourly();
    let total = |values: &[(i64, i64)]| values.iter().map(|(_, v)| v).sum::<i64>();
    println!(
        "last {}h: tries {} sent {} failed {}",
        hourly.slice,
        total(&hourly.tries.values),
        total(&hourly.sent.values),
        total(&hourly.failed.values)
    );
    let gauges = board.gauges();
    let slices = |s: &[dashboard::Slice], fmt: fn(f64) -> String| {
        s.iter()
            .map(|s| format!("{} {}", s.key, fmt(s.y)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("cpu: {}", slices(&gauges.cpu, dashboard::format_percent));
    println!("memory: {}", slices(&gauges.memory, dashboard::format_mb));
    println!("disk: {}", slices(&gauges.disk, dashboard::format_gb));
    for handle in board.handles() {
        println!("  poller {:<16} {:?}", handle.name(), handle.state());
    }
}
