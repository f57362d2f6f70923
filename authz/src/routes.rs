//! Named route table.
//!
//! The HTTP layer registers every route it serves under a stable name. Actions
//! refer to routes by those names, and clients render concrete paths from them.

use crate::error::{AuthzError, Result};
use crate::types::HttpVerb;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A named route: verb plus path template with `:param` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    pub method: HttpVerb,
    pub path: String,
    /// `path` with every `:param` replaced by `%s`, trimmed of `/`.
    pub format: String,
    /// Placeholder names in the order they appear in `path`.
    #[serde(skip)]
    params: Vec<String>,
}

impl Route {
    pub fn new(name: impl Into<String>, method: HttpVerb, path: impl Into<String>) -> Self {
        let path = path.into();
        let (format, params) = derive_format(&path);
        Self {
            name: name.into(),
            method,
            path,
            format,
            params,
        }
    }

    /// Placeholder names in declaration order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Renders a concrete path by applying `params` positionally.
    ///
    /// With no params, or a template without placeholders, the template is
    /// returned trimmed of slashes. Placeholders without a matching param keep
    /// their `:name` token; extra params are ignored.
    pub fn render(&self, params: &[&str]) -> String {
        if self.params.is_empty() || params.is_empty() {
            return self.path.trim_matches('/').to_string();
        }

        let mut rendered = String::with_capacity(self.format.len());
        for (index, piece) in self.format.split("%s").enumerate() {
            if index > 0 {
                match params.get(index - 1) {
                    Some(value) => rendered.push_str(value),
                    None => {
                        rendered.push(':');
                        rendered.push_str(&self.params[index - 1]);
                    }
                }
            }
            rendered.push_str(piece);
        }
        rendered
    }

    /// Matches a concrete path (without base path) against the template and
    /// returns the placeholder values by name.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let template: Vec<&str> = self.path.trim_matches('/').split('/').collect();
        let concrete: Vec<&str> = path.trim_matches('/').split('/').collect();
        if template.len() != concrete.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (expected, actual) in template.iter().zip(&concrete) {
            match expected.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    if actual.is_empty() {
                        return None;
                    }
                    params.insert(name.to_string(), actual.to_string());
                }
                _ if expected == actual => {}
                _ => return None,
            }
        }
        Some(params)
    }
}

/// Replaces each `:identifier` token with `%s` and trims leading/trailing `/`.
fn derive_format(path: &str) -> (String, Vec<String>) {
    let mut format = String::with_capacity(path.len());
    let mut params = Vec::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ':' {
            format.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            // a bare colon is not a placeholder
            format.push(':');
        } else {
            format.push_str("%s");
            params.push(name);
        }
    }

    (format.trim_matches('/').to_string(), params)
}

/// Name-keyed route table.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<String, Route>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::DuplicateRoute`] if the name is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        method: HttpVerb,
        path: impl Into<String>,
    ) -> Result<&Route> {
        let route = Route::new(name, method, path);
        if self.routes.contains_key(&route.name) {
            return Err(AuthzError::DuplicateRoute(route.name));
        }

        let name = route.name.clone();
        Ok(self.routes.entry(name).or_insert(route))
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Renders the route registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` was never registered. Route names are compile-time
    /// constants of the caller, so an unknown name is a programming error. Use
    /// [`RouteRegistry::try_render`] to get an error instead.
    pub fn render(&self, name: &str, params: &[&str]) -> String {
        match self.try_render(name, params) {
            Ok(path) => path,
            Err(err) => panic!("{}", err),
        }
    }

    /// Renders the route registered under `name`, or fails with
    /// [`AuthzError::UnknownRoute`].
    pub fn try_render(&self, name: &str, params: &[&str]) -> Result<String> {
        self.routes
            .get(name)
            .map(|route| route.render(params))
            .ok_or_else(|| AuthzError::UnknownRoute(name.to_string()))
    }

    /// Reverse lookup of the route registered for an exact verb and template.
    pub fn find_by_path(&self, method: &str, path: &str) -> Option<&Route> {
        self.routes
            .values()
            .find(|route| route.method.as_str() == method && route.path == path)
    }

    /// Resolves a concrete request path to its route and path parameters.
    ///
    /// When several templates match, the one with the fewest placeholders wins.
    pub fn match_request(&self, method: &str, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        self.routes
            .values()
            .filter(|route| route.method.as_str() == method)
            .filter_map(|route| route.match_path(path).map(|params| (route, params)))
            .min_by_key(|(route, _)| route.params.len())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
