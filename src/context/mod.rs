//! Context subsystem: per-thread application and request scopes.
//!
//! # Data Flow
//! ```text
//! App::handle (on the worker thread owning the request)
//!     → request_ctx.rs push
//!         → app_ctx.rs push (only if another app, or none, is active)
//!         → open session, resolve route, set working directory
//!     → handler and hooks read current_app() / current_request() /
//!       current_session() / with_g()
//!     → request_ctx.rs pop(error)
//!         → teardown hooks, release session
//!         → app_ctx.rs pop (if this request activated it)
//! ```
//!
//! # Design Decisions
//! - Stacks are thread-local; a request is handled start to finish on one
//!   thread, so push and pop need no locking
//! - Push returns a guard; popping out of order is a bug and panics
//! - Dropping a guard pops it with no error, so early returns stay balanced

pub mod app_ctx;
pub mod request_ctx;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::LocalKey;

use thiserror::Error;

use crate::dispatch::App;
use crate::http::request::Request;
use crate::session::Session;

pub use app_ctx::{AppContext, AppContextGuard, G};
pub use request_ctx::{RequestContext, RequestContextGuard};

use app_ctx::AppFrame;
use request_ctx::RequestFrame;

thread_local! {
    static APP_STACK: RefCell<Vec<Rc<AppFrame>>> = const { RefCell::new(Vec::new()) };
    static REQUEST_STACK: RefCell<Vec<Rc<RequestFrame>>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error(
        "Working outside of application context. This typically means that you \
         attempted to use functionality that needed the current application. \
         Push an AppContext, or run the code inside a dispatched request."
    )]
    NoAppContext,

    #[error(
        "Working outside of request context. This typically means that you \
         attempted to use functionality that needed an active HTTP request. \
         Push a RequestContext, or run the code inside a dispatched request."
    )]
    NoRequestContext,
}

/// Remove `frame` from `stack`, returning whether it was on top.
fn remove_top<T>(stack: &'static LocalKey<RefCell<Vec<Rc<T>>>>, frame: &Rc<T>) -> bool {
    stack.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last() {
            Some(top) if Rc::ptr_eq(top, frame) => {
                stack.pop();
                true
            }
            _ => {
                if let Some(pos) = stack.iter().rposition(|f| Rc::ptr_eq(f, frame)) {
                    stack.remove(pos);
                }
                false
            }
        }
    })
}

fn top_app() -> Option<Rc<AppFrame>> {
    APP_STACK.with(|stack| stack.borrow().last().cloned())
}

fn top_request() -> Option<Rc<RequestFrame>> {
    REQUEST_STACK.with(|stack| stack.borrow().last().cloned())
}

pub fn has_app_context() -> bool {
    top_app().is_some()
}

pub fn has_request_context() -> bool {
    top_request().is_some()
}

/// The application of the innermost active context.
pub fn current_app() -> Result<App, ContextError> {
    top_app()
        .map(|frame| frame.app.clone())
        .ok_or(ContextError::NoAppContext)
}

pub fn current_request() -> Result<Arc<Request>, ContextError> {
    top_request()
        .map(|frame| Arc::clone(&frame.request))
        .ok_or(ContextError::NoRequestContext)
}

/// The session of the current request (the null session if none was opened).
pub fn current_session() -> Result<Session, ContextError> {
    current_request().map(|request| request.session())
}

/// Run `f` with the `g` namespace of the innermost app context.
///
/// # Panics
/// If called again from inside `f`.
pub fn with_g<R>(f: impl FnOnce(&mut G) -> R) -> Result<R, ContextError> {
    let frame = top_app().ok_or(ContextError::NoAppContext)?;
    let mut g = frame.g.borrow_mut();
    Ok(f(&mut g))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn app(name: &str) -> App {
        App::builder(name).build()
    }

    #[test]
    fn test_accessors_fail_outside_context() {
        assert_eq!(current_app().unwrap_err(), ContextError::NoAppContext);
        assert_eq!(current_request().unwrap_err(), ContextError::NoRequestContext);
        assert!(current_session().is_err());
        assert!(with_g(|_| ()).is_err());
        assert!(ContextError::NoAppContext
            .to_string()
            .starts_with("Working outside of application context."));
    }

    #[test]
    fn test_app_context_nesting() {
        let ctx = AppContext::new(app("nest"));
        let outer = ctx.push();
        with_g(|g| g.insert(5u32)).unwrap();

        let inner = ctx.push();
        assert_eq!(with_g(|g| g.get::<u32>().copied()).unwrap(), Some(5));
        inner.pop();
        assert_eq!(current_app().unwrap().name(), "nest");

        outer.pop();
        assert!(!has_app_context());

        let again = ctx.push();
        assert_eq!(with_g(|g| g.get::<u32>().copied()).unwrap(), None);
        drop(again);
    }

    #[test]
    fn test_request_context_owns_app_context() {
        let app = app("owner");
        let ctx = RequestContext::new(app.clone(), Arc::new(Request::new(Method::GET, "/")));
        let guard = ctx.push();
        assert!(current_app().unwrap().ptr_eq(&app));
        assert_eq!(current_request().unwrap().path(), "/");
        assert!(current_session().unwrap().is_null());
        guard.pop(None);
        assert!(!has_app_context());
        assert!(!has_request_context());
    }

    #[test]
    fn test_request_context_reuses_active_app() {
        let app = app("shared");
        let app_guard = AppContext::new(app.clone()).push();
        with_g(|g| g.insert("kept")).unwrap();

        let ctx = RequestContext::new(app, Arc::new(Request::new(Method::GET, "/")));
        let guard = ctx.push();
        assert_eq!(with_g(|g| g.get::<&str>().copied()).unwrap(), Some("kept"));
        guard.pop(None);

        assert!(has_app_context());
        app_guard.pop();
    }

    #[test]
    fn test_other_app_gets_its_own_context() {
        let first = app("first");
        let second = app("second");
        let app_guard = AppContext::new(first).push();

        let ctx = RequestContext::new(second.clone(), Arc::new(Request::new(Method::GET, "/")));
        let guard = ctx.push();
        assert!(current_app().unwrap().ptr_eq(&second));
        guard.pop(None);

        assert_eq!(current_app().unwrap().name(), "first");
        app_guard.pop();
    }

    #[test]
    #[should_panic(expected = "Popped wrong request context")]
    fn test_out_of_order_pop_panics() {
        let app = app("order");
        let a = RequestContext::new(app.clone(), Arc::new(Request::new(Method::GET, "/a")));
        let b = RequestContext::new(app, Arc::new(Request::new(Method::GET, "/b")));
        let guard_a = a.push();
        let _guard_b = b.push();
        guard_a.pop(None);
    }
}
