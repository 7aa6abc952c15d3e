//! Console screens and the login guard evaluated before entering one.
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::debug;

use crate::session::SessionContext;

static MAILING_VIEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/mailings/(\d+)$").expect("valid mailing route pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Index,
    Statistics,
    Mailings,
    MailingView { mailing_id: i64, tab: Option<String> },
    DomainsStats,
    Tables,
    Settings,
    SettingsNetwork,
    SettingsDns,
    SettingsTime,
    SettingsCm,
    SettingsSatellites,
    SettingsAuth,
    About,
    Todo,
}

impl Route {
    /// Resolve a URL path; anything unknown lands on the index.
    pub fn parse(url: &str) -> Route {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        match path {
            "/login" => Route::Login,
            "/" => Route::Index,
            "/statistics" => Route::Statistics,
            "/mailings" => Route::Mailings,
            "/stats/domains" => Route::DomainsStats,
            "/tables" => Route::Tables,
            "/settings" => Route::Settings,
            "/settings/network" => Route::SettingsNetwork,
            "/settings/dns" => Route::SettingsDns,
            "/settings/time" => Route::SettingsTime,
            "/settings/cm" => Route::SettingsCm,
            "/settings/satellites" => Route::SettingsSatellites,
            "/settings/auth" => Route::SettingsAuth,
            "/about" => Route::About,
            "/todo" => Route::Todo,
            other => match MAILING_VIEW
                .captures(other)
                .and_then(|caps| caps[1].parse::<i64>().ok())
            {
                Some(mailing_id) => Route::MailingView {
                    mailing_id,
                    tab: query.and_then(tab_param),
                },
                None => {
                    debug!(url, "unknown route, falling back to index");
                    Route::Index
                }
            },
        }
    }

    /// State name used by the menu and the guard.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Login => "login",
            Route::Index => "index",
            Route::Statistics => "statistics",
            Route::Mailings => "mailings",
            Route::MailingView { .. } => "mailing-view",
            Route::DomainsStats => "domains-stats",
            Route::Tables => "tables",
            Route::Settings => "settings",
            Route::SettingsNetwork => "settings-network",
            Route::SettingsDns => "settings-dns",
            Route::SettingsTime => "settings-time",
            Route::SettingsCm => "settings-cm",
            Route::SettingsSatellites => "settings-satellites",
            Route::SettingsAuth => "settings-auth",
            Route::About => "about",
            Route::Todo => "todo",
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::MailingView { mailing_id, tab } => match tab {
                Some(tab) => format!("/mailings/{mailing_id}?p={tab}"),
                None => format!("/mailings/{mailing_id}"),
            },
            Route::Login => "/login".into(),
            Route::Index => "/".into(),
            Route::Statistics => "/statistics".into(),
            Route::Mailings => "/mailings".into(),
            Route::DomainsStats => "/stats/domains".into(),
            Route::Tables => "/tables".into(),
            Route::Settings => "/settings".into(),
            Route::SettingsNetwork => "/settings/network".into(),
            Route::SettingsDns => "/settings/dns".into(),
            Route::SettingsTime => "/settings/time".into(),
            Route::SettingsCm => "/settings/cm".into(),
            Route::SettingsSatellites => "/settings/satellites".into(),
            Route::SettingsAuth => "/settings/auth".into(),
            Route::About => "/about".into(),
            Route::Todo => "/todo".into(),
        }
    }

    /// Screens that need a logged-in user.
    pub fn is_restricted(&self) -> bool {
        !matches!(self, Route::Login | Route::About)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn tab_param(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "p")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed(Route),
    Redirect(Route),
}

impl Navigation {
    /// Where the console ends up.
    pub fn target(&self) -> &Route {
        match self {
            Navigation::Proceed(route) | Navigation::Redirect(route) => route,
        }
    }
}

/// Resolve the current user before entering `route`. Anonymous users are
/// sent to the login screen; logged-in users skip it.
pub async fn guard(route: Route, session: &SessionContext) -> Navigation {
    match session.current_user().await {
        Ok(_) if route == Route::Login => Navigation::Redirect(Route::Index),
        Ok(_) => Navigation::Proceed(route),
        Err(err) if route.is_restricted() => {
            debug!(route = route.name(), ?err, "not logged user requesting page");
            Navigation::Redirect(Route::Login)
        }
        Err(_) => Navigation::Proceed(route),
    }
}
