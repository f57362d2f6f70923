//! Core authorization types shared by actions, roles and users.
//!
//! # Security Considerations
//!
//! ## Exact matching
//! Endpoints are matched on the exact HTTP verb and the exact route template
//! (`/api/v1/namespaces/:namespace/applications`). There is no prefix, glob or
//! regex matching at this layer, so a new route is denied until an action
//! explicitly lists it.
//!
//! ## Deny by default
//! Every [`Authorizable`] answers `false` unless something explicitly allows
//! the request. There is no error path in a decision: callers cannot confuse a
//! denial with a transient failure.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Base path of the REST API.
pub const API_BASE_PATH: &str = "/api/v1";

/// Base path of the websocket API.
pub const WS_BASE_PATH: &str = "/wapi/v1";

/// The HTTP verbs routes can be registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    /// The canonical, upper case name of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpVerb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpVerb::Get),
            "POST" => Ok(HttpVerb::Post),
            "PUT" => Ok(HttpVerb::Put),
            "PATCH" => Ok(HttpVerb::Patch),
            "DELETE" => Ok(HttpVerb::Delete),
            other => Err(format!("unsupported HTTP verb '{}'", other)),
        }
    }
}

/// An API endpoint: verb, base path (`/api/v1`) and path (`/applications`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpVerb,
    pub base_path: String,
    pub path: String,
}

impl Endpoint {
    pub fn new(method: HttpVerb, base_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            base_path: base_path.into(),
            path: path.into(),
        }
    }

    /// Creates an endpoint under the REST base path.
    pub fn api(method: HttpVerb, path: impl Into<String>) -> Self {
        Self::new(method, API_BASE_PATH, path)
    }

    /// Creates an endpoint under the websocket base path.
    pub fn ws(method: HttpVerb, path: impl Into<String>) -> Self {
        Self::new(method, WS_BASE_PATH, path)
    }

    /// The base path joined with the path, as matched against requests.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.base_path, self.path)
    }

    /// Exact match on verb and full path.
    pub fn matches(&self, method: &str, full_path: &str) -> bool {
        self.method.as_str() == method
            && full_path.len() == self.base_path.len() + self.path.len()
            && full_path.starts_with(&self.base_path)
            && full_path.ends_with(&self.path)
    }
}

/// A request as seen by the decision engine.
///
/// `full_path` is the route template the request matched, including the base
/// path. `params` holds the path parameters by name.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub method: &'a str,
    pub full_path: &'a str,
    pub params: &'a HashMap<String, String>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(method: &'a str, full_path: &'a str, params: &'a HashMap<String, String>) -> Self {
        Self {
            method,
            full_path,
            params,
        }
    }

    /// The `namespace` path parameter, if the route has one.
    pub fn namespace(&self) -> Option<&'a str> {
        self.params.get("namespace").map(String::as_str)
    }
}

/// Anything that can answer an authorization question.
///
/// Implemented by actions, roles, role sets and users; each level applies its
/// own rule and delegates to the level below.
pub trait Authorizable {
    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_round_trip() {
        for verb in [
            HttpVerb::Get,
            HttpVerb::Post,
            HttpVerb::Put,
            HttpVerb::Patch,
            HttpVerb::Delete,
        ] {
            assert_eq!(verb.as_str().parse::<HttpVerb>(), Ok(verb));
        }
        assert!("get".parse::<HttpVerb>().is_err());
        assert!("OPTIONS".parse::<HttpVerb>().is_err());
    }

    #[test]
    fn test_endpoint_full_path() {
        let endpoint = Endpoint::api(HttpVerb::Get, "/namespaces/:namespace");
        assert_eq!(endpoint.full_path(), "/api/v1/namespaces/:namespace");

        let endpoint = Endpoint::ws(HttpVerb::Get, "/namespaces/:namespace/applications/:app/logs");
        assert_eq!(
            endpoint.full_path(),
            "/wapi/v1/namespaces/:namespace/applications/:app/logs"
        );
    }

    #[test]
    fn test_endpoint_matches_exactly() {
        let endpoint = Endpoint::api(HttpVerb::Get, "/namespaces");
        assert!(endpoint.matches("GET", "/api/v1/namespaces"));
        assert!(!endpoint.matches("POST", "/api/v1/namespaces"));
        assert!(!endpoint.matches("GET", "/api/v1/namespaces/"));
        assert!(!endpoint.matches("GET", "/wapi/v1/namespaces"));
        assert!(!endpoint.matches("GET", "/api/v1/namespace"));
        assert!(!endpoint.matches("get", "/api/v1/namespaces"));
    }

    #[test]
    fn test_verb_serde_uses_upper_case() {
        let json = serde_json::to_string(&HttpVerb::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
    }
}
