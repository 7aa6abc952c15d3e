//! Declarative table of the master's REST resources.
use reqwest::{Method, Url};
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};

/// One REST resource. A *natural* endpoint follows the `/api/<name>/:id`
/// convention; an unnatural one is called at its exact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub resource: String,
    pub path: String,
    pub natural: bool,
    pub methods: Vec<Method>,
}

fn default_methods() -> Vec<Method> {
    vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ]
}

impl EndpointSpec {
    /// Conventional endpoint for `name`: resource key is the camel-cased name,
    /// path is `/api/<name>`.
    pub fn from_name(name: &str) -> Self {
        Self {
            resource: camel_case(name),
            path: format!("/api/{name}"),
            natural: true,
            methods: default_methods(),
        }
    }

    /// Natural endpoint at an explicit path.
    pub fn at(resource: &str, path: &str) -> Self {
        Self {
            resource: resource.to_string(),
            path: path.to_string(),
            natural: true,
            methods: default_methods(),
        }
    }

    /// Endpoint outside the `/:id` convention.
    pub fn unnatural(resource: &str, path: &str, methods: &[Method]) -> Self {
        Self {
            resource: resource.to_string(),
            path: path.to_string(),
            natural: false,
            methods: methods.to_vec(),
        }
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn check(&self, method: &Method) -> ApiResult<()> {
        if self.allows(method) {
            Ok(())
        } else {
            Err(ApiError::MethodNotAllowed {
                resource: self.resource.clone(),
                method: method.clone(),
            })
        }
    }

    /// Absolute URL of this resource, with `/<id>` appended for natural endpoints.
    pub fn url(&self, base_url: &str, id: Option<&str>) -> ApiResult<Url> {
        let mut raw = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        if self.natural {
            if let Some(id) = id.filter(|id| !id.is_empty()) {
                raw.push('/');
                raw.push_str(id);
            }
        }
        Url::parse(&raw).map_err(|err| ApiError::Url(format!("{raw}: {err}")))
    }
}

#[derive(Debug, Clone)]
pub struct EndpointTable {
    endpoints: HashMap<String, EndpointSpec>,
}

impl EndpointTable {
    pub fn new(specs: impl IntoIterator<Item = EndpointSpec>) -> Self {
        let endpoints = specs
            .into_iter()
            .map(|spec| (spec.resource.clone(), spec))
            .collect();
        Self { endpoints }
    }

    /// Every resource the console talks to.
    pub fn cloud_mailing() -> Self {
        Self::new([
            EndpointSpec::at("cm", "/api"),
            EndpointSpec::from_name("os"),
            EndpointSpec::at("cpu", "/api/os/cpu"),
            EndpointSpec::at("memory", "/api/os/memory"),
            EndpointSpec::at("disk", "/api/os/disk"),
            EndpointSpec::unnatural(
                "authenticate",
                "/api/authenticate",
                &[Method::GET, Method::POST],
            ),
            EndpointSpec::unnatural("logout", "/api/logout", &[Method::POST]),
            EndpointSpec::from_name("mailings"),
            EndpointSpec::from_name("recipients"),
            EndpointSpec::from_name("satellites"),
            EndpointSpec::from_name("hourly-stats"),
            EndpointSpec::at("fw", "/api/fw"),
            EndpointSpec::at("fw_network", "/api/fw/network"),
            EndpointSpec::at("fw_time", "/api/fw/time"),
            EndpointSpec::unnatural("fw_all_tz", "/api/fw/time/all_tz", &[Method::GET]),
        ])
    }

    pub fn get(&self, resource: &str) -> ApiResult<&EndpointSpec> {
        self.endpoints
            .get(resource)
            .ok_or_else(|| ApiError::UnknownResource(resource.to_string()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::cloud_mailing()
    }
}

/// `hourly-stats` -> `hourlyStats`
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' || c == '_' || c == ' ' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://cm.local:33610";

    #[test]
    fn conventional_names() {
        assert_eq!(camel_case("hourly-stats"), "hourlyStats");
        assert_eq!(camel_case("mailings"), "mailings");
        let spec = EndpointSpec::from_name("hourly-stats");
        assert_eq!(spec.resource, "hourlyStats");
        assert_eq!(spec.path, "/api/hourly-stats");
        assert!(spec.natural);
    }

    #[test]
    fn natural_endpoint_appends_id() {
        let table = EndpointTable::cloud_mailing();
        let mailings = table.get("mailings").unwrap();
        assert_eq!(
            mailings.url(BASE, Some("42")).unwrap().as_str(),
            "http://cm.local:33610/api/mailings/42"
        );
        assert_eq!(
            mailings.url(BASE, None).unwrap().as_str(),
            "http://cm.local:33610/api/mailings"
        );
        let hourly = table.get("hourlyStats").unwrap();
        assert_eq!(
            hourly.url(&format!("{BASE}/"), Some("7")).unwrap().path(),
            "/api/hourly-stats/7"
        );
    }

    #[test]
    fn unnatural_endpoint_ignores_id() {
        let table = EndpointTable::cloud_mailing();
        let auth = table.get("authenticate").unwrap();
        assert!(!auth.natural);
        assert_eq!(auth.url(BASE, Some("1")).unwrap().path(), "/api/authenticate");
    }

    #[test]
    fn undeclared_methods_are_rejected() {
        let table = EndpointTable::cloud_mailing();
        let all_tz = table.get("fw_all_tz").unwrap();
        assert!(all_tz.check(&Method::GET).is_ok());
        assert!(matches!(
            all_tz.check(&Method::PUT),
            Err(ApiError::MethodNotAllowed { .. })
        ));
        assert!(table.get("mailings").unwrap().check(&Method::PATCH).is_ok());
    }

    #[test]
    fn unknown_resource() {
        let table = EndpointTable::cloud_mailing();
        assert!(matches!(table.get("nope"), Err(ApiError::UnknownResource(_))));
    }
}
