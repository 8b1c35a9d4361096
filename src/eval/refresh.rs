//! Step that reconciles recorded state with the real infrastructure.

use super::context::EvalScope;
use super::{EvalResult, Flow};
use crate::error::Error;
use crate::provider::{provider_for_type, InstanceInfo};

/// Refresh the state register through the provider.
///
/// The provider sees the recorded instance (possibly none) and returns the
/// instance as it exists now; a vanished instance reads back as `None`.
pub(super) fn refresh(scope: &mut EvalScope, info: &InstanceInfo) -> EvalResult {
    let provider = scope
        .provider
        .clone()
        .ok_or_else(|| Error::UnknownProvider(provider_for_type(&info.resource_type).to_string()))?;

    log::debug!("{}: refreshing", info.id);
    scope.state = provider.refresh(info, scope.state.as_ref())?;
    Ok(Flow::Continue)
}
