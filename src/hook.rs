//! Observer hooks fired during evaluation.
//!
//! Hooks run on the evaluating thread while the state lock is held in shared
//! mode; implementations must not attempt to write state.

use crate::error::{Error, Result};
use crate::provider::InstanceInfo;
use crate::state::{InstanceState, State};

/// What the walk should do after a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Keep dispatching to the remaining hooks
    Continue,
    /// Stop dispatching this event
    Halt,
}

/// Observer of evaluation progress, typically a UI.
pub trait Hook: Send + Sync {
    /// An apply finished for `info`, successfully or not.
    fn post_apply(
        &self,
        _info: &InstanceInfo,
        _state: Option<&InstanceState>,
        _error: Option<&Error>,
    ) -> Result<HookAction> {
        Ok(HookAction::Continue)
    }

    /// The shared state changed.
    fn post_state_update(&self, _state: &State) -> Result<HookAction> {
        Ok(HookAction::Continue)
    }
}

/// Hook that observes nothing.
pub struct NoHook;

impl Hook for NoHook {}
