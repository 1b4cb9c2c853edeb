//! Lifecycle hooks.
//!
//! # Design Decisions
//! - `before_request` hooks run in registration order; the first one that
//!   returns a result short-circuits the handler
//! - `after_request` and teardown hooks run most recently registered first
//! - Hooks may be registered while the app is serving; each run works on a
//!   snapshot of the list

use std::sync::Arc;

use parking_lot::RwLock;

use crate::dispatch::{DispatchError, HandlerResult};
use crate::http::request::Request;
use crate::http::response::Response;

pub type BeforeRequestFn =
    Arc<dyn Fn(&Request) -> Result<Option<HandlerResult>, DispatchError> + Send + Sync>;

/// May modify or replace the response in place.
pub type AfterRequestFn =
    Arc<dyn Fn(&Request, &mut Response) -> Result<(), DispatchError> + Send + Sync>;

/// Receives the error that ended the request, if any.
pub type TeardownFn =
    Arc<dyn Fn(&Request, Option<&DispatchError>) -> Result<(), DispatchError> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Hooks {
    before: RwLock<Vec<BeforeRequestFn>>,
    after: RwLock<Vec<AfterRequestFn>>,
    teardown: RwLock<Vec<TeardownFn>>,
}

impl Hooks {
    pub(crate) fn add_before(&self, hook: BeforeRequestFn) {
        self.before.write().push(hook);
    }

    pub(crate) fn add_after(&self, hook: AfterRequestFn) {
        self.after.write().push(hook);
    }

    pub(crate) fn add_teardown(&self, hook: TeardownFn) {
        self.teardown.write().push(hook);
    }

    /// Run `before_request` hooks until one produces a result.
    pub(crate) fn preprocess(&self, request: &Request) -> Result<Option<HandlerResult>, DispatchError> {
        let hooks = self.before.read().clone();
        for hook in hooks {
            if let Some(rv) = hook(request)? {
                return Ok(Some(rv));
            }
        }
        Ok(None)
    }

    pub(crate) fn process_response(
        &self,
        request: &Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let hooks = self.after.read().clone();
        for hook in hooks.iter().rev() {
            hook(request, response)?;
        }
        Ok(())
    }

    /// Run every teardown hook; failures are logged and do not stop the rest.
    pub(crate) fn teardown(&self, request: &Request, error: Option<&DispatchError>) {
        let hooks = self.teardown.read().clone();
        for hook in hooks.iter().rev() {
            if let Err(e) = hook(request, error) {
                tracing::error!(path = %request.path(), error = %e, "Teardown hook failed");
            }
        }
    }

    pub(crate) fn counts(&self) -> (usize, usize, usize) {
        (
            self.before.read().len(),
            self.after.read().len(),
            self.teardown.read().len(),
        )
    }
}
