//! Compiled route lookup.
//!
//! # Responsibilities
//! - Order descriptors by specificity once, at compile time
//! - Resolve (method, path, host) to a descriptor and typed parameters
//! - Report `NotFound`, `MethodNotAllowed` (with the allowed set) or a
//!   trailing-slash `Redirect`
//! - Build URLs for endpoints
//!
//! # Design Decisions
//! - Stable sort, so equally specific patterns keep declaration order
//! - Allowed methods are reported in a fixed order for stable `Allow` headers

use std::sync::Arc;

use axum::http::Method;

use crate::routing::descriptor::{Endpoint, RouteDescriptor};
use crate::routing::pattern::{PathParams, PatternMatch, SplitPath};
use crate::routing::site::ModuleId;
use crate::routing::RoutingError;

/// A successful route resolution.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteDescriptor>,
    pub params: PathParams,
    pub module: Option<ModuleId>,
}

/// The request attributes a lookup needs.
#[derive(Debug, Clone, Copy)]
pub struct MatchTarget<'a> {
    pub method: &'a Method,
    /// Path with the application root already removed, still percent-encoded.
    pub path: &'a str,
    /// Normalized host (lowercase, no port).
    pub host: Option<&'a str>,
    pub query: Option<&'a str>,
    /// Application root without a trailing slash; prefixed to redirects.
    pub script_root: &'a str,
}

/// Routes of one module, frozen for lookup.
#[derive(Debug, Default)]
pub struct CompiledMatcher {
    routes: Vec<Arc<RouteDescriptor>>,
    module: Option<ModuleId>,
}

impl CompiledMatcher {
    pub fn new(mut routes: Vec<Arc<RouteDescriptor>>) -> Self {
        routes.sort_by(|a, b| a.pattern().cmp_specificity(b.pattern()));
        Self {
            routes,
            module: None,
        }
    }

    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }

    pub fn module(&self) -> Option<&ModuleId> {
        self.module.as_ref()
    }

    /// Routes in lookup order.
    pub fn routes(&self) -> &[Arc<RouteDescriptor>] {
        &self.routes
    }

    pub fn lookup(&self, target: &MatchTarget<'_>) -> Result<RouteMatch, RoutingError> {
        let path = SplitPath::new(target.path);
        let mut allowed: Vec<Method> = Vec::new();
        let mut redirect: Option<String> = None;

        for route in &self.routes {
            if let Some(host) = route.host() {
                if target.host != Some(host) {
                    continue;
                }
            }

            let Some(outcome) = route.pattern().matches(&path, route.strict_slashes()) else {
                continue;
            };

            if !route.allows(target.method) {
                // A route reachable only through the slash redirect does
                // not make the path exist for other methods.
                if matches!(outcome, PatternMatch::MissingSlash(_)) {
                    continue;
                }
                for method in route.allowed_methods() {
                    if !allowed.contains(&method) {
                        allowed.push(method);
                    }
                }
                continue;
            }

            match outcome {
                PatternMatch::Exact(params) => {
                    return Ok(RouteMatch {
                        route: Arc::clone(route),
                        params,
                        module: self.module.clone(),
                    });
                }
                PatternMatch::MissingSlash(_) => {
                    if redirect.is_none() {
                        redirect = Some(slash_redirect_location(target));
                    }
                }
            }
        }

        if let Some(location) = redirect {
            return Err(RoutingError::Redirect { location });
        }
        if !allowed.is_empty() {
            allowed.sort_by_key(method_order);
            return Err(RoutingError::MethodNotAllowed { allowed });
        }
        Err(RoutingError::NotFound)
    }

    /// Build the path for `endpoint`, without the application root.
    pub fn build(&self, endpoint: &Endpoint, params: &PathParams) -> Option<String> {
        self.routes
            .iter()
            .filter(|route| route.endpoint() == endpoint)
            .find_map(|route| route.pattern().build(params))
    }
}

fn slash_redirect_location(target: &MatchTarget<'_>) -> String {
    let mut location = format!("{}{}/", target.script_root, target.path);
    if let Some(query) = target.query.filter(|q| !q.is_empty()) {
        location.push('?');
        location.push_str(query);
    }
    location
}

fn method_order(method: &Method) -> u8 {
    match *method {
        Method::GET => 0,
        Method::HEAD => 1,
        Method::POST => 2,
        Method::PUT => 3,
        Method::DELETE => 4,
        Method::PATCH => 5,
        Method::OPTIONS => 6,
        Method::TRACE => 7,
        _ => 8,
    }
}
