//! Dispatch states, traced as a request moves through the lifecycle.

use std::fmt;

use crate::http::request::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Matched,
    PreProcessed,
    HandlerInvoked,
    Coerced,
    PostProcessed,
    Finalized,
    Error,
}

impl DispatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchState::Received => "received",
            DispatchState::Matched => "matched",
            DispatchState::PreProcessed => "pre_processed",
            DispatchState::HandlerInvoked => "handler_invoked",
            DispatchState::Coerced => "coerced",
            DispatchState::PostProcessed => "post_processed",
            DispatchState::Finalized => "finalized",
            DispatchState::Error => "error",
        }
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Move `request` to `to` and trace the edge actually taken.
pub(crate) fn advance(request: &Request, to: DispatchState) {
    let from = request.replace_dispatch_state(to);
    tracing::trace!(path = %request.path(), from = %from, to = %to, "Dispatch state change");
}
