//! Request context: one request, its session and its routing outcome.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::context::app_ctx::{AppContext, AppContextGuard};
use crate::context::{remove_top, top_app, REQUEST_STACK};
use crate::dispatch::{App, DispatchError};
use crate::http::request::Request;

pub(crate) struct RequestFrame {
    pub(crate) app: App,
    pub(crate) request: Arc<Request>,
    pushes: Cell<usize>,
    /// One entry per push; `Some` when that push activated the app itself.
    owned_app: RefCell<Vec<Option<AppContextGuard>>>,
}

/// Activation of a request on the current thread.
#[derive(Clone)]
pub struct RequestContext {
    frame: Rc<RequestFrame>,
}

impl RequestContext {
    pub fn new(app: App, request: Arc<Request>) -> Self {
        Self {
            frame: Rc::new(RequestFrame {
                app,
                request,
                pushes: Cell::new(0),
                owned_app: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn app(&self) -> &App {
        &self.frame.app
    }

    pub fn request(&self) -> &Arc<Request> {
        &self.frame.request
    }

    /// Activate this request.
    ///
    /// Activates the app first unless it is already the active one, then
    /// opens the session (falling back to the null session) and resolves the
    /// route. Both happen once per request, however often it is pushed.
    #[must_use = "the context is popped when the guard is dropped"]
    pub fn push(&self) -> RequestContextGuard {
        let frame = &self.frame;
        let app_active = top_app().is_some_and(|top| top.app.ptr_eq(&frame.app));
        let owned = (!app_active).then(|| AppContext::new(frame.app.clone()).push());
        frame.owned_app.borrow_mut().push(owned);

        REQUEST_STACK.with(|stack| stack.borrow_mut().push(Rc::clone(frame)));
        frame.pushes.set(frame.pushes.get() + 1);

        let request = &frame.request;
        if !request.has_session() {
            let session = frame.app.open_session(request);
            request.set_session(session);
        }
        if request.resolution().is_none() {
            frame.app.resolve_request(request);
        }

        tracing::trace!(path = %request.path(), depth = frame.pushes.get(), "Request context pushed");
        RequestContextGuard {
            frame: Some(Rc::clone(frame)),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.frame.request.method())
            .field("path", &self.frame.request.path())
            .field("pushes", &self.frame.pushes.get())
            .finish()
    }
}

/// Pops its [`RequestContext`]; the last pop runs teardown hooks.
pub struct RequestContextGuard {
    frame: Option<Rc<RequestFrame>>,
}

impl RequestContextGuard {
    /// Pop with the error that ended the request, if any.
    ///
    /// # Panics
    /// If this context is not the topmost request context on the thread.
    pub fn pop(mut self, error: Option<&DispatchError>) {
        self.pop_inner(error, true);
    }

    fn pop_inner(&mut self, error: Option<&DispatchError>, strict: bool) {
        let Some(frame) = self.frame.take() else {
            return;
        };

        let is_top = REQUEST_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|top| Rc::ptr_eq(top, &frame))
        });
        if !is_top && strict {
            remove_top(&REQUEST_STACK, &frame);
            panic!(
                "Popped wrong request context. (expected {} {})",
                frame.request.method(),
                frame.request.path()
            );
        }

        let remaining = frame.pushes.get().saturating_sub(1);
        if remaining == 0 {
            if strict {
                frame.app.do_teardown_request(&frame.request, error);
            } else {
                tracing::warn!(path = %frame.request.path(), "Skipping teardown hooks while unwinding");
            }
            frame.request.release_session();
        }
        remove_top(&REQUEST_STACK, &frame);
        frame.pushes.set(remaining);
        tracing::trace!(path = %frame.request.path(), depth = remaining, "Request context popped");

        let owned = frame.owned_app.borrow_mut().pop().flatten();
        if let Some(app_guard) = owned {
            if strict {
                app_guard.pop();
            }
        }
    }
}

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        self.pop_inner(None, !std::thread::panicking());
    }
}

impl fmt::Debug for RequestContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContextGuard")
            .field("active", &self.frame.is_some())
            .finish()
    }
}
