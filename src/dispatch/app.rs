//! The application handle and the dispatch state machine.
//!
//! # Responsibilities
//! - Own configuration (hot-swappable), route modules, hooks and the
//!   session/template/file collaborators
//! - Resolve requests against the owning route module
//! - Drive one request through hooks, handler, coercion, session save and
//!   teardown, turning errors into responses
//!
//! # Design Decisions
//! - `App` is a cheap `Arc` handle; every worker thread dispatches through
//!   the same instance
//! - A request is dispatched synchronously on the calling thread, which owns
//!   its context stacks for the whole lifecycle
//! - Configuration is read once per request from an `ArcSwap`

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::http::header::{self, HeaderValue};
use axum::http::Method;

use crate::config::AppConfig;
use crate::context::{current_request, RequestContext};
use crate::dispatch::coerce::make_response;
use crate::dispatch::hooks::Hooks;
use crate::dispatch::state::{advance, DispatchState};
use crate::dispatch::{DispatchError, HandlerResult};
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::transport::{Envelope, ResponseSink};
use crate::observability::metrics;
use crate::render::{FileResolver, FsResolver, PlaceholderRenderer, TemplateRenderer};
use crate::routing::{
    Endpoint, HostPolicy, MatchTarget, PathParams, RouteDescriptor, RouteError, RouteMatch,
    RouteModule, RouteRegistry, RoutingError, Site,
};
use crate::session::{SecureCookieSessionInterface, Session, SessionInterface};

struct AppInner {
    name: String,
    config: ArcSwap<AppConfig>,
    site: Site,
    root: Option<PathBuf>,
    hooks: Hooks,
    sessions: Box<dyn SessionInterface>,
    templates: Box<dyn TemplateRenderer>,
    files: Box<dyn FileResolver>,
}

/// Handle to an application. Clones share the same application.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

/// Builder for [`App`].
pub struct AppBuilder {
    name: String,
    config: AppConfig,
    root: Option<PathBuf>,
    sessions: Box<dyn SessionInterface>,
    templates: Box<dyn TemplateRenderer>,
    files: Box<dyn FileResolver>,
}

impl AppBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: AppConfig::default(),
            root: None,
            sessions: Box::new(SecureCookieSessionInterface::new()),
            templates: Box::new(PlaceholderRenderer::new()),
            files: Box::new(FsResolver::new()),
        }
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Site directory; requests resolve templates and files against it
    /// unless their route module names its own directory.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn session_interface(mut self, sessions: impl SessionInterface + 'static) -> Self {
        self.sessions = Box::new(sessions);
        self
    }

    pub fn template_renderer(mut self, templates: impl TemplateRenderer + 'static) -> Self {
        self.templates = Box::new(templates);
        self
    }

    pub fn file_resolver(mut self, files: impl FileResolver + 'static) -> Self {
        self.files = Box::new(files);
        self
    }

    pub fn build(self) -> App {
        App {
            inner: Arc::new(AppInner {
                name: self.name,
                config: ArcSwap::from_pointee(self.config),
                site: Site::new(),
                root: self.root,
                hooks: Hooks::default(),
                sessions: self.sessions,
                templates: self.templates,
                files: self.files,
            }),
        }
    }
}

impl App {
    pub fn builder(name: impl Into<String>) -> AppBuilder {
        AppBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether both handles refer to the same application.
    pub fn ptr_eq(&self, other: &App) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.inner.config.load_full()
    }

    /// Swap in a new configuration; requests already running keep theirs.
    pub fn replace_config(&self, config: AppConfig) {
        self.inner.config.store(Arc::new(config));
        tracing::info!(app = %self.inner.name, "Configuration replaced");
    }

    pub fn site(&self) -> &Site {
        &self.inner.site
    }

    pub fn root(&self) -> Option<&Path> {
        self.inner.root.as_deref()
    }

    /// Mount a route module declared by `declare` under `prefix`.
    pub fn mount<F>(&self, id: &str, prefix: &str, declare: F) -> Arc<RouteModule>
    where
        F: Fn(&mut RouteRegistry) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.inner.site.mount(id, prefix, declare)
    }

    pub fn mount_module(&self, module: RouteModule) -> Arc<RouteModule> {
        self.inner.site.mount_module(module)
    }

    pub fn session_interface(&self) -> &dyn SessionInterface {
        self.inner.sessions.as_ref()
    }

    pub fn templates(&self) -> &dyn TemplateRenderer {
        self.inner.templates.as_ref()
    }

    pub fn files(&self) -> &dyn FileResolver {
        self.inner.files.as_ref()
    }

    /// Run `hook` before every handler; a returned result replaces the handler.
    pub fn before_request<F>(&self, hook: F) -> &Self
    where
        F: Fn(&Request) -> Result<Option<HandlerResult>, DispatchError> + Send + Sync + 'static,
    {
        self.inner.hooks.add_before(Arc::new(hook));
        self
    }

    /// Run `hook` on every response produced by the dispatcher.
    pub fn after_request<F>(&self, hook: F) -> &Self
    where
        F: Fn(&Request, &mut Response) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.inner.hooks.add_after(Arc::new(hook));
        self
    }

    /// Run `hook` when the request context is torn down, whatever happened.
    pub fn teardown_request<F>(&self, hook: F) -> &Self
    where
        F: Fn(&Request, Option<&DispatchError>) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.inner.hooks.add_teardown(Arc::new(hook));
        self
    }

    /// Dispatch one request and stream the response into `sink`.
    pub fn call(&self, envelope: Envelope, sink: &mut dyn ResponseSink) -> Result<(), DispatchError> {
        let response = self.handle(envelope)?;
        response.write_to(sink)?;
        Ok(())
    }

    /// Dispatch one request.
    ///
    /// Returns `Err` only in propagate mode, after teardown has run.
    pub fn handle(&self, envelope: Envelope) -> Result<Response, DispatchError> {
        let start = Instant::now();
        let config = self.config();
        let request = Arc::new(Request::from_envelope(envelope, config.debug));
        tracing::debug!(method = %request.method(), path = %request.path(), "Dispatching request");

        let ctx = RequestContext::new(self.clone(), Arc::clone(&request));
        let guard = ctx.push();

        let mut error = None;
        let response = match self.full_dispatch_request(&request, &config) {
            Ok(response) => Some(response),
            Err(err) => {
                advance(&request, DispatchState::Error);
                let response = self.handle_exception(&request, &config, &err);
                error = Some(err);
                response
            }
        };
        guard.pop(error.as_ref());

        let method = request.method().as_str();
        let endpoint = request
            .endpoint()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string());
        match (response, error) {
            (Some(response), _) => {
                metrics::record_request(method, response.status().as_u16(), &endpoint, start);
                Ok(response)
            }
            (None, Some(err)) => {
                metrics::record_request(method, 500, &endpoint, start);
                Err(err)
            }
            (None, None) => Err(DispatchError::Contract(
                "dispatch finished without a response".to_string(),
            )),
        }
    }

    /// Resolve `request` against the module owning its path.
    pub fn match_request(&self, request: &Request) -> Result<RouteMatch, RoutingError> {
        let config = self.config();
        let host = HostPolicy::from_config(&config).check(request.host())?;

        let root = config.application_root.trim_end_matches('/');
        let path = match request.path().strip_prefix(root) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => return Err(RoutingError::NotFound),
        };

        let module = self.inner.site.resolve(path).ok_or(RoutingError::NotFound)?;
        let matcher = module.matcher().map_err(RoutingError::Declaration)?;
        matcher.lookup(&MatchTarget {
            method: request.method(),
            path,
            host: host.as_deref(),
            query: request.query_string(),
            script_root: root,
        })
    }

    /// Build the URL of `endpoint`, preferring the current request's module.
    pub fn url_for(
        &self,
        endpoint: impl Into<Endpoint>,
        params: &PathParams,
    ) -> Result<String, DispatchError> {
        let endpoint = endpoint.into();
        let current = current_request()
            .ok()
            .and_then(|request| request.route_match().and_then(|m| m.module.clone()));

        let mut modules = self.inner.site.modules();
        if let Some(current) = current {
            modules.sort_by_key(|module| module.id() != &current);
        }

        let config = self.config();
        let root = config.application_root.trim_end_matches('/');
        for module in modules {
            if let Some(path) = module.matcher()?.build(&endpoint, params) {
                return Ok(format!("{root}{path}"));
            }
        }
        Err(DispatchError::UrlBuild(endpoint.to_string()))
    }

    pub(crate) fn open_session(&self, request: &Request) -> Session {
        let config = self.config();
        self.inner
            .sessions
            .open_session(&config, request)
            .unwrap_or_else(|| self.inner.sessions.make_null_session())
    }

    /// Record the routing outcome and working directory on `request`.
    pub(crate) fn resolve_request(&self, request: &Request) {
        let resolution = self.match_request(request);
        if let Err(err) = &resolution {
            tracing::debug!(path = %request.path(), kind = err.kind(), "Route resolution failed");
            metrics::record_routing_failure(err.kind());
        }
        let cwd = self.request_cwd(resolution.as_ref().ok());
        if resolution.is_ok() {
            advance(request, DispatchState::Matched);
        }
        request.set_resolution(resolution);
        request.set_cwd(cwd);
    }

    fn request_cwd(&self, route_match: Option<&RouteMatch>) -> PathBuf {
        let module_dir = route_match
            .and_then(|m| m.module.as_ref())
            .and_then(|id| self.inner.site.module(id))
            .and_then(|module| module.dir().map(Path::to_path_buf));

        match (module_dir, &self.inner.root) {
            (Some(dir), Some(root)) if dir.is_relative() => root.join(dir),
            (Some(dir), _) => dir,
            (None, Some(root)) => root.clone(),
            (None, None) => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub(crate) fn do_teardown_request(&self, request: &Request, error: Option<&DispatchError>) {
        self.inner.hooks.teardown(request, error);
    }

    fn full_dispatch_request(
        &self,
        request: &Request,
        config: &AppConfig,
    ) -> Result<Response, DispatchError> {
        let path = request.path();
        let rv = match self.inner.hooks.preprocess(request) {
            Ok(Some(rv)) => {
                advance(request, DispatchState::PreProcessed);
                tracing::debug!(path = %path, "before_request hook answered the request");
                Ok(rv)
            }
            Ok(None) => {
                advance(request, DispatchState::PreProcessed);
                let rv = self.dispatch_request(request);
                if rv.is_ok() {
                    advance(request, DispatchState::HandlerInvoked);
                }
                rv
            }
            Err(err) => Err(err),
        };

        let rv = match rv {
            Ok(rv) => rv,
            Err(err) => self.handle_user_exception(request, err)?,
        };
        self.finalize_request(request, config, rv, false)
    }

    fn dispatch_request(&self, request: &Request) -> Result<HandlerResult, DispatchError> {
        let route_match = match request.resolution() {
            Some(Ok(route_match)) => route_match,
            Some(Err(err)) => return Err(raise_routing_exception(request, err)),
            None => return Err(HttpError::NotFound.into()),
        };

        let route = &route_match.route;
        if request.method() == Method::OPTIONS && route.provide_automatic_options() {
            return Ok(HandlerResult::Response(default_options_response(route)?));
        }
        (route.handler())(request, &route_match.params)
    }

    /// Turn protocol errors into their responses; anything else goes on.
    fn handle_user_exception(
        &self,
        request: &Request,
        err: DispatchError,
    ) -> Result<HandlerResult, DispatchError> {
        match err {
            DispatchError::Http(http) => {
                let http = if request.is_debug() {
                    http.with_visible_detail()
                } else {
                    http
                };
                tracing::debug!(path = %request.path(), status = http.status().as_u16(), "HTTP error raised");
                Ok(HandlerResult::Response(http.to_response()))
            }
            other => Err(other),
        }
    }

    /// Answer an unhandled error, or `None` to let it propagate.
    fn handle_exception(
        &self,
        request: &Request,
        config: &AppConfig,
        err: &DispatchError,
    ) -> Option<Response> {
        if config.propagate_exceptions() {
            return None;
        }

        tracing::error!(
            method = %request.method(),
            path = %request.path(),
            error = %err,
            "Exception on {} [{}]",
            request.path(),
            request.method()
        );

        let server_error = match err {
            DispatchError::Io(_) => HttpError::NotFound,
            _ => HttpError::InternalServerError {
                detail: config.debug.then(|| err.to_string()),
            },
        };
        let rv = HandlerResult::Response(server_error.to_response());
        match self.finalize_request(request, config, rv, true) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::error!(path = %request.path(), error = %e, "Error response could not be built");
                Some(server_error.to_response())
            }
        }
    }

    fn finalize_request(
        &self,
        request: &Request,
        config: &AppConfig,
        rv: HandlerResult,
        from_error_handler: bool,
    ) -> Result<Response, DispatchError> {
        let path = request.path();
        let mut response = make_response(self, request, rv)?;
        advance(request, DispatchState::Coerced);

        if let Err(err) = self.process_response(request, config, &mut response) {
            if !from_error_handler {
                return Err(err);
            }
            tracing::error!(
                path = %path,
                error = %err,
                "Request finalizing failed with an error while handling an error"
            );
        }
        advance(request, DispatchState::Finalized);
        Ok(response)
    }

    fn process_response(
        &self,
        request: &Request,
        config: &AppConfig,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        self.inner.hooks.process_response(request, response)?;
        advance(request, DispatchState::PostProcessed);

        let session = request.session();
        if !self.inner.sessions.is_null_session(&session) {
            self.inner.sessions.save_session(config, &session, response)?;
        }
        Ok(())
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (before, after, teardown) = self.inner.hooks.counts();
        f.debug_struct("App")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("modules", &self.inner.site.len())
            .field("before_request", &before)
            .field("after_request", &after)
            .field("teardown_request", &teardown)
            .finish()
    }
}

fn is_safe_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD || method == Method::OPTIONS
}

/// A deferred routing failure, as raised at dispatch time.
///
/// A trailing-slash redirect is only followed by safe methods; other
/// methods get the plain not-found error so no request body is lost.
fn raise_routing_exception(request: &Request, err: &RoutingError) -> DispatchError {
    match err {
        RoutingError::Redirect { location } if !is_safe_method(request.method()) => {
            tracing::debug!(
                method = %request.method(),
                path = %request.path(),
                location = %location,
                "Not redirecting an unsafe method"
            );
            HttpError::NotFound.into()
        }
        other => other.clone().into(),
    }
}

fn default_options_response(route: &RouteDescriptor) -> Result<Response, DispatchError> {
    let allow = route
        .allowed_methods()
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut response = Response::empty();
    response.set_header(header::ALLOW, HeaderValue::from_str(&allow)?);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::methods::{GET, POST};
    use crate::web;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;

    fn quiet_config() -> AppConfig {
        AppConfig {
            debug: false,
            testing: false,
            propagate_exceptions: Some(false),
            ..AppConfig::default()
        }
    }

    fn app_with_routes() -> App {
        let app = App::builder("unit").config(quiet_config()).build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/echo", GET).endpoint("echo").register(r, |_, _| Ok(json!({"msg": "hi"}).into()))?;
            web!("/items/", GET, POST).endpoint("items").register(r, |_, _| Ok("items".into()))?;
            web!("/user/<int:id>").endpoint("user").register(r, |_, p| {
                Ok(json!({"id": p.get_int("id")}).into())
            })?;
            web!("/boom").register(r, |_, _| Err(DispatchError::Contract("boom".to_string())))?;
            web!("/none").register(r, |_, _| Ok(HandlerResult::None))?;
            Ok(())
        });
        app
    }

    #[test]
    fn test_match_request_strips_application_root() {
        let app = app_with_routes();
        app.replace_config(AppConfig {
            application_root: "/app".to_string(),
            ..quiet_config()
        });

        let matched = app.match_request(&Request::new(Method::GET, "/app/echo")).unwrap();
        assert_eq!(matched.route.rule(), "/echo");
        assert_eq!(
            app.match_request(&Request::new(Method::GET, "/application/echo"))
                .unwrap_err(),
            RoutingError::NotFound
        );
        assert_eq!(
            app.match_request(&Request::new(Method::GET, "/echo")).unwrap_err(),
            RoutingError::NotFound
        );
    }

    #[test]
    fn test_url_for_named_endpoint() {
        let app = app_with_routes();
        let url = app
            .url_for("user", &PathParams::new().with("id", 7i64))
            .unwrap();
        assert_eq!(url, "/user/7");
        assert!(matches!(
            app.url_for("missing", &PathParams::new()),
            Err(DispatchError::UrlBuild(_))
        ));
    }

    #[test]
    fn test_automatic_options_lists_allowed_methods() {
        let app = app_with_routes();
        let response = app.handle(Envelope::new(Method::OPTIONS, "/echo")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let allow = response.header("allow").unwrap();
        assert!(allow.contains("GET"));
        assert!(allow.contains("OPTIONS"));
    }

    #[test]
    fn test_trailing_slash_redirect_only_for_safe_methods() {
        let app = app_with_routes();
        let get = app.handle(Envelope::new(Method::GET, "/items")).unwrap();
        assert_eq!(get.status(), StatusCode::PERMANENT_REDIRECT);
        assert!(get.header("location").unwrap().ends_with("/items/"));

        let post = app.handle(Envelope::new(Method::POST, "/items")).unwrap();
        assert_eq!(post.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unhandled_error_becomes_500_without_detail() {
        let app = app_with_routes();
        let response = app.handle(Envelope::new(Method::GET, "/boom")).unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.body().as_bytes().unwrap();
        assert!(!String::from_utf8_lossy(body).contains("boom"));
    }

    #[test]
    fn test_debug_error_shows_detail() {
        let app = app_with_routes();
        app.replace_config(AppConfig {
            debug: true,
            ..quiet_config()
        });
        let response = app.handle(Envelope::new(Method::GET, "/boom")).unwrap();
        let body = response.body().as_bytes().unwrap();
        assert!(String::from_utf8_lossy(body).contains("boom"));
    }

    #[test]
    fn test_none_result_is_a_contract_error() {
        let app = app_with_routes();
        app.replace_config(AppConfig {
            propagate_exceptions: Some(true),
            ..quiet_config()
        });
        let err = app.handle(Envelope::new(Method::GET, "/none")).unwrap_err();
        assert!(err.to_string().contains("did not return a valid response"));
    }

    #[test]
    fn test_propagated_error_still_runs_teardown() {
        let app = app_with_routes();
        app.replace_config(AppConfig {
            testing: true,
            propagate_exceptions: None,
            ..quiet_config()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        app.teardown_request(move |_: &Request, err: Option<&DispatchError>| {
            log.lock().unwrap().push(err.map(ToString::to_string));
            Ok(())
        });

        let err = app.handle(Envelope::new(Method::GET, "/boom")).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*seen.lock().unwrap(), vec![Some("boom".to_string())]);
    }

    #[test]
    fn test_before_request_short_circuits_handler() {
        let app = app_with_routes();
        app.before_request(|request: &Request| {
            Ok((request.path() == "/echo").then(|| HandlerResult::html("intercepted")))
        });

        let response = app.handle(Envelope::new(Method::GET, "/echo")).unwrap();
        assert_eq!(response.body().as_bytes(), Some(&b"intercepted"[..]));
    }

    #[test]
    fn test_handle_leaves_no_context_behind() {
        let app = app_with_routes();
        app.handle(Envelope::new(Method::GET, "/echo")).unwrap();
        app.handle(Envelope::new(Method::GET, "/boom")).unwrap();
        assert!(!crate::context::has_request_context());
        assert!(!crate::context::has_app_context());
    }

    #[test]
    fn test_hooks_observe_the_current_dispatch_state() {
        let app = app_with_routes();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        app.before_request(move |request: &Request| {
            log.lock().unwrap().push(format!("before {}", request.dispatch_state()));
            Ok(None)
        });
        let log = Arc::clone(&seen);
        app.after_request(move |request: &Request, _: &mut Response| {
            log.lock().unwrap().push(format!("after {}", request.dispatch_state()));
            Ok(())
        });
        let log = Arc::clone(&seen);
        app.teardown_request(move |request: &Request, _: Option<&DispatchError>| {
            log.lock().unwrap().push(format!("teardown {}", request.dispatch_state()));
            Ok(())
        });

        app.handle(Envelope::new(Method::GET, "/echo")).unwrap();
        app.handle(Envelope::new(Method::GET, "/missing")).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "before matched",
                "after coerced",
                "teardown finalized",
                "before received",
                "after coerced",
                "teardown finalized",
            ]
        );

        app.replace_config(AppConfig {
            propagate_exceptions: Some(true),
            ..quiet_config()
        });
        seen.lock().unwrap().clear();
        app.handle(Envelope::new(Method::GET, "/boom")).unwrap_err();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["before matched", "teardown error"]
        );
    }
}
