//! Steps that execute diffs and run provisioners.
//!
//! Provider and provisioner failures are recorded on the scope rather than
//! raised immediately: the remaining bookkeeping steps (state writes, diff
//! clearing, undepose) still run, and the post-apply hook surfaces the
//! recorded error as its own result once they have.

use super::context::{EvalContext, EvalScope};
use super::{EvalResult, Flow};
use crate::config::ProvisionerConfig;
use crate::error::Error;
use crate::interpolate::InstanceRef;
use crate::provider::{provider_for_type, InstanceInfo};

/// Execute the working diff through the provider.
pub(super) fn apply(scope: &mut EvalScope, info: &InstanceInfo, track_create: bool) -> EvalResult {
    let diff = match &scope.diff_apply {
        Some(diff) if !diff.is_empty() => diff.clone(),
        _ => {
            log::debug!("{}: nothing to apply", info.id);
            return Ok(Flow::Continue);
        }
    };
    let provider = scope
        .provider
        .clone()
        .ok_or_else(|| Error::UnknownProvider(provider_for_type(&info.resource_type).to_string()))?;

    if track_create {
        let exists = scope
            .state
            .as_ref()
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        scope.create_new = !exists || diff.requires_new();
    }

    log::debug!(
        "{}: executing apply (destroy: {}, requires_new: {})",
        info.id,
        diff.destroy,
        diff.requires_new()
    );
    match provider.apply(info, scope.state.as_ref(), &diff) {
        Ok(new_state) => scope.state = new_state,
        Err(err) => {
            log::warn!("{}: apply failed: {}", info.id, err);
            scope.error = Some(err);
        }
    }
    Ok(Flow::Continue)
}

/// Run provisioners against a freshly created instance, in declared order.
///
/// Skipped for in-place updates and when the apply itself already failed.
/// The first provisioner failure stops the run and taints the instance.
pub(super) fn apply_provisioners(
    ctx: &EvalContext,
    scope: &mut EvalScope,
    info: &InstanceInfo,
    provisioners: &[ProvisionerConfig],
    resource: &InstanceRef,
) -> EvalResult {
    if scope.error.is_some() || !scope.create_new || provisioners.is_empty() {
        return Ok(Flow::Continue);
    }
    let state = match &scope.state {
        Some(state) if !state.is_empty() => state.clone(),
        _ => return Ok(Flow::Continue),
    };

    for p in provisioners {
        let provisioner = ctx.provisioner(&p.kind)?;
        let config = ctx.interpolate(&p.raw, resource)?;

        log::debug!("{}: running provisioner {}", info.id, p.kind);
        if let Err(err) = provisioner.apply(info, &state, &config) {
            log::warn!("{}: provisioner {} failed: {}", info.id, p.kind, err);
            scope.error = Some(err);
            scope.tainted = true;
            break;
        }
    }
    Ok(Flow::Continue)
}

/// Fire the post-apply hook, then yield the recorded error as this step's
/// result so a failed apply stops the subsequence here.
pub(super) fn apply_post(ctx: &EvalContext, scope: &mut EvalScope, info: &InstanceInfo) -> EvalResult {
    ctx.hook(|h| h.post_apply(info, scope.state.as_ref(), scope.error.as_ref()))?;
    match scope.error.take() {
        Some(err) => Err(err),
        None => Ok(Flow::Continue),
    }
}
