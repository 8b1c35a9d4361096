//! Steps that compute, store, and compare instance diffs.

use super::context::{EvalContext, EvalScope};
use super::{DiffReg, DiffRetire, EvalResult, Flow};
use crate::diff::InstanceDiff;
use crate::error::Error;
use crate::provider::{provider_for_type, InstanceInfo};

fn reg<'a>(scope: &'a EvalScope, reg: DiffReg) -> &'a Option<InstanceDiff> {
    match reg {
        DiffReg::Saved => &scope.diff_saved,
        DiffReg::Apply => &scope.diff_apply,
    }
}

fn reg_mut(scope: &mut EvalScope, target: DiffReg) -> &mut Option<InstanceDiff> {
    match target {
        DiffReg::Saved => &mut scope.diff_saved,
        DiffReg::Apply => &mut scope.diff_apply,
    }
}

/// Compute a diff from the state and config registers through the provider.
pub(super) fn diff(
    scope: &mut EvalScope,
    info: &InstanceInfo,
    into: DiffReg,
    update_state: bool,
) -> EvalResult {
    let provider = scope
        .provider
        .clone()
        .ok_or_else(|| Error::UnknownProvider(provider_for_type(&info.resource_type).to_string()))?;
    let config = scope.config.clone().unwrap_or_default();

    let (mut diff, new_state) = provider.diff(info, scope.state.as_ref(), &config)?;

    // A replacement of an existing instance also destroys it; the destroy
    // vertex keys off this flag.
    if let Some(d) = diff.as_mut() {
        let exists = scope
            .state
            .as_ref()
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if exists && d.requires_new() {
            d.destroy = true;
        }
    }
    log::debug!(
        "{}: provider diff computed (changes: {})",
        info.id,
        diff.is_some()
    );

    *reg_mut(scope, into) = diff;
    if update_state {
        scope.state = new_state;
    }
    Ok(Flow::Continue)
}

/// Produce a destroy-only diff into the saved register.
pub(super) fn diff_destroy(scope: &mut EvalScope, info: &InstanceInfo) -> EvalResult {
    log::debug!("{}: planning destroy", info.id);
    scope.diff_saved = Some(InstanceDiff::for_destroy());
    Ok(Flow::Continue)
}

/// Force the saved diff's destroy flag when tainted instances exist for the
/// key, leaving its attribute changes untouched.
pub(super) fn diff_tainted(ctx: &EvalContext, scope: &mut EvalScope, key: &str) -> EvalResult {
    let has_tainted = ctx.with_state_read(|state| {
        state
            .module(ctx.path())
            .and_then(|m| m.resources.get(key))
            .map(|rs| !rs.tainted.is_empty())
            .unwrap_or(false)
    });
    if !has_tainted {
        return Ok(Flow::Continue);
    }

    log::debug!("{}: tainted instances present, diff will destroy", key);
    match scope.diff_saved.as_mut() {
        Some(diff) => diff.destroy = true,
        None => scope.diff_saved = Some(InstanceDiff::for_destroy()),
    }
    Ok(Flow::Continue)
}

/// Fail with a mismatch unless the saved and working diffs describe the
/// same change. Missing registers compare as empty diffs.
pub(super) fn compare_diff(scope: &mut EvalScope, info: &InstanceInfo) -> EvalResult {
    let empty = InstanceDiff::default();
    let saved = scope.diff_saved.as_ref().unwrap_or(&empty);
    let applying = scope.diff_apply.as_ref().unwrap_or(&empty);

    if let Err(reason) = saved.same(applying) {
        log::warn!("{}: plan/apply divergence: {}", info.id, reason);
        return Err(Error::DiffMismatch {
            key: info.id.clone(),
            reason,
        });
    }
    Ok(Flow::Continue)
}

/// Reduce the working diff to its destroy-only shape.
pub(super) fn filter_diff(scope: &mut EvalScope) -> EvalResult {
    scope.diff_apply = scope.diff_apply.as_ref().map(InstanceDiff::to_destroy);
    Ok(Flow::Continue)
}

/// Read the stored diff for `key` into a register.
pub(super) fn read_diff(
    ctx: &EvalContext,
    scope: &mut EvalScope,
    key: &str,
    into: DiffReg,
) -> EvalResult {
    let diff = ctx.with_diffs_read(|diffs| {
        diffs
            .module(ctx.path())
            .and_then(|m| m.diffs.get(key).cloned())
    });
    *reg_mut(scope, into) = diff;
    Ok(Flow::Continue)
}

/// Mark the stored diff for `key` consumed.
///
/// A replacement is executed by two vertices sharing one saved diff, so the
/// vertex that runs first may only retire its own share: the create side of
/// a create-before-destroy leaves the destroy-only remainder behind, and the
/// destroy side of a destroy-before-create leaves everything but a pure
/// destroy for the create vertex running after it.
pub(super) fn retire_diff(ctx: &EvalContext, key: &str, mode: DiffRetire) -> EvalResult {
    ctx.with_diffs_write(|diffs| {
        let module = diffs.add_module(ctx.path());
        match mode {
            DiffRetire::Clear => {
                module.diffs.remove(key);
            }
            DiffRetire::KeepDestroy => {
                let remainder = module.diffs.get(key).map(InstanceDiff::to_destroy);
                match remainder {
                    Some(d) if d.is_destroy() => {
                        module.diffs.insert(key.to_string(), d);
                    }
                    _ => {
                        module.diffs.remove(key);
                    }
                }
            }
            DiffRetire::ClearIfDestroy => {
                if module.diffs.get(key).map(|d| d.is_destroy()).unwrap_or(false) {
                    module.diffs.remove(key);
                }
            }
        }
    });
    Ok(Flow::Continue)
}

/// Write a register to the diff store; `from = None` clears the stored
/// diff so later walks do not see an already-consumed plan.
pub(super) fn write_diff(
    ctx: &EvalContext,
    scope: &mut EvalScope,
    key: &str,
    from: Option<DiffReg>,
) -> EvalResult {
    let diff = from.and_then(|r| reg(scope, r).clone());
    ctx.with_diffs_write(|diffs| {
        let module = diffs.add_module(ctx.path());
        match diff {
            Some(d) => {
                module.diffs.insert(key.to_string(), d);
            }
            None => {
                module.diffs.remove(key);
            }
        }
    });
    Ok(Flow::Continue)
}
