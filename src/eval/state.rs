//! Steps that read and mutate the shared state store.
//!
//! Every step acquires the lock for the duration of one read or one write
//! and releases it before returning; none holds it across a provider call.

use super::context::{EvalContext, EvalScope};
use super::{EvalResult, Flow, InstanceSlot, StateSink};
use crate::error::{Error, Result};
use crate::state::InstanceState;

/// Read an instance slot into the state register.
///
/// A missing module or resource row reads as "no instance"; only an
/// out-of-range tainted index is an error.
pub(super) fn read_state(
    ctx: &EvalContext,
    scope: &mut EvalScope,
    key: &str,
    slot: InstanceSlot,
) -> EvalResult {
    let instance: Result<Option<InstanceState>> = ctx.with_state_read(|state| {
        let rs = match state.module(ctx.path()).and_then(|m| m.resources.get(key)) {
            Some(rs) => rs,
            None => return Ok(None),
        };
        match slot {
            InstanceSlot::Primary => Ok(rs.primary.clone()),
            InstanceSlot::Deposed => Ok(rs.deposed.clone()),
            InstanceSlot::Tainted(index) => {
                let idx = match index {
                    Some(i) => i,
                    None => rs.tainted.len().checked_sub(1).ok_or_else(|| {
                        Error::BadTaintedIndex {
                            key: key.to_string(),
                            index: -1,
                        }
                    })?,
                };
                let instance = rs.tainted.get(idx).ok_or_else(|| Error::BadTaintedIndex {
                    key: key.to_string(),
                    index: idx as i64,
                })?;
                Ok(Some(instance.clone()))
            }
        }
    });

    scope.state = instance?;
    log::trace!(
        "read state for {}: instance {}",
        key,
        scope.state.as_ref().map(|s| s.id.as_str()).unwrap_or("-")
    );
    Ok(Flow::Continue)
}

/// Write the state register to the store.
///
/// Always refreshes the row's type and dependency labels; the sink decides
/// which instance slot the register lands in.
pub(super) fn write_state(
    ctx: &EvalContext,
    scope: &mut EvalScope,
    key: &str,
    resource_type: &str,
    dependencies: &[String],
    sink: StateSink,
) -> EvalResult {
    ctx.with_state_write(|state| {
        let module = state.add_module(ctx.path());
        let rs = module.resources.entry(key.to_string()).or_default();
        rs.resource_type = resource_type.to_string();
        rs.dependencies = dependencies.to_vec();

        match sink {
            StateSink::Primary => rs.primary = scope.state.clone(),
            StateSink::Deposed => rs.deposed = scope.state.clone(),
            StateSink::Tainted { index } => {
                let idx = match index {
                    Some(i) => i,
                    None => match rs.tainted.len().checked_sub(1) {
                        Some(i) => i,
                        None => return,
                    },
                };
                if idx >= rs.tainted.len() {
                    return;
                }
                match scope.state.clone() {
                    Some(instance) if !instance.is_empty() => rs.tainted[idx] = instance,
                    _ => {
                        rs.tainted.remove(idx);
                    }
                }
            }
            StateSink::TaintedFlag { clear_primary } => {
                if scope.tainted {
                    if let Some(instance) = scope.state.clone() {
                        rs.tainted.push(instance);
                    }
                    if clear_primary {
                        rs.primary = None;
                    }
                } else {
                    rs.primary = scope.state.clone();
                }
            }
        }
    });

    log::debug!("wrote state for {}", key);
    Ok(Flow::Continue)
}

/// Move primary aside so a create-before-destroy replacement can build
/// while the old instance survives.
pub(super) fn depose_state(ctx: &EvalContext, key: &str) -> EvalResult {
    ctx.with_state_write(|state| {
        if let Some(rs) = state
            .module_mut(ctx.path())
            .and_then(|m| m.resources.get_mut(key))
        {
            rs.depose();
        }
    });
    log::debug!("deposed primary for {}", key);
    Ok(Flow::Continue)
}

/// Restore the deposed instance as primary after a failed replacement.
pub(super) fn undepose_state(ctx: &EvalContext, key: &str) -> EvalResult {
    ctx.with_state_write(|state| {
        if let Some(rs) = state
            .module_mut(ctx.path())
            .and_then(|m| m.resources.get_mut(key))
        {
            rs.undepose();
        }
    });
    log::debug!("restored deposed primary for {}", key);
    Ok(Flow::Continue)
}

/// Queue the deposed instance for destruction once its replacement
/// succeeded; the destroy-variant vertex consumes it later in the walk.
pub(super) fn taint_deposed(ctx: &EvalContext, key: &str) -> EvalResult {
    ctx.with_state_write(|state| {
        if let Some(rs) = state
            .module_mut(ctx.path())
            .and_then(|m| m.resources.get_mut(key))
        {
            rs.taint_deposed();
        }
    });
    Ok(Flow::Continue)
}

/// Early-exit unless the state register holds an instance with an id.
pub(super) fn require_state(scope: &mut EvalScope) -> EvalResult {
    match &scope.state {
        Some(instance) if !instance.is_empty() => Ok(Flow::Continue),
        _ => {
            log::debug!("require state: nothing to act on");
            Ok(Flow::EarlyExit)
        }
    }
}

/// Notify hooks that the shared state changed.
///
/// The state lock is held in shared mode for the duration of the dispatch.
pub(super) fn update_state_hook(ctx: &EvalContext) -> EvalResult {
    ctx.with_state_read(|state| ctx.hook(|h| h.post_state_update(state)))?;
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{root_module_path, ResourceState, State};
    use crate::walk::WalkPhase;

    fn ctx_with(state: State) -> EvalContext {
        EvalContext::builder(WalkPhase::Apply)
            .state(state.shared())
            .build()
    }

    fn seeded(key: &str, rs: ResourceState) -> EvalContext {
        let mut state = State::new();
        state
            .add_module(&root_module_path())
            .resources
            .insert(key.to_string(), rs);
        ctx_with(state)
    }

    #[test]
    fn test_read_state_missing_resource_is_none() {
        let ctx = ctx_with(State::new());
        let mut scope = EvalScope::new();
        read_state(&ctx, &mut scope, "x.a", InstanceSlot::Primary).unwrap();
        assert!(scope.state.is_none());
    }

    #[test]
    fn test_read_state_slots() {
        let mut rs = ResourceState::default();
        rs.primary = Some(InstanceState::new("i-p"));
        rs.deposed = Some(InstanceState::new("i-d"));
        rs.tainted.push(InstanceState::new("i-t0"));
        rs.tainted.push(InstanceState::new("i-t1"));
        let ctx = seeded("x.a", rs);

        let mut scope = EvalScope::new();
        read_state(&ctx, &mut scope, "x.a", InstanceSlot::Primary).unwrap();
        assert_eq!(scope.state.as_ref().unwrap().id, "i-p");

        read_state(&ctx, &mut scope, "x.a", InstanceSlot::Deposed).unwrap();
        assert_eq!(scope.state.as_ref().unwrap().id, "i-d");

        // None addresses the most recent tainted entry
        read_state(&ctx, &mut scope, "x.a", InstanceSlot::Tainted(None)).unwrap();
        assert_eq!(scope.state.as_ref().unwrap().id, "i-t1");

        read_state(&ctx, &mut scope, "x.a", InstanceSlot::Tainted(Some(0))).unwrap();
        assert_eq!(scope.state.as_ref().unwrap().id, "i-t0");
    }

    #[test]
    fn test_read_state_bad_tainted_index() {
        let ctx = seeded("x.a", ResourceState::default());
        let mut scope = EvalScope::new();
        let err = read_state(&ctx, &mut scope, "x.a", InstanceSlot::Tainted(None)).unwrap_err();
        assert!(err.to_string().contains("bad tainted index"));
    }

    #[test]
    fn test_write_state_primary_creates_row() {
        let ctx = ctx_with(State::new());
        let mut scope = EvalScope::new();
        scope.state = Some(InstanceState::new("i-0"));

        let deps = vec!["net.main".to_string()];
        write_state(&ctx, &mut scope, "x.a", "x", &deps, StateSink::Primary).unwrap();

        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert_eq!(rs.resource_type, "x");
            assert_eq!(rs.dependencies, deps);
            assert_eq!(rs.primary.as_ref().unwrap().id, "i-0");
        });
    }

    #[test]
    fn test_write_state_tainted_flag_appends_and_clears_primary() {
        let mut rs = ResourceState::default();
        rs.primary = Some(InstanceState::new("i-old"));
        let ctx = seeded("x.a", rs);

        let mut scope = EvalScope::new();
        scope.tainted = true;
        scope.state = Some(InstanceState::new("i-bad"));
        write_state(
            &ctx,
            &mut scope,
            "x.a",
            "x",
            &[],
            StateSink::TaintedFlag {
                clear_primary: true,
            },
        )
        .unwrap();

        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert!(rs.primary.is_none());
            assert_eq!(rs.tainted.len(), 1);
            assert_eq!(rs.tainted[0].id, "i-bad");
        });
    }

    #[test]
    fn test_write_state_tainted_flag_untainted_writes_primary() {
        let ctx = ctx_with(State::new());
        let mut scope = EvalScope::new();
        scope.state = Some(InstanceState::new("i-0"));
        write_state(
            &ctx,
            &mut scope,
            "x.a",
            "x",
            &[],
            StateSink::TaintedFlag {
                clear_primary: false,
            },
        )
        .unwrap();

        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert_eq!(rs.primary.as_ref().unwrap().id, "i-0");
            assert!(rs.tainted.is_empty());
        });
    }

    #[test]
    fn test_write_state_tainted_slot_removes_on_empty() {
        let mut rs = ResourceState::default();
        rs.tainted.push(InstanceState::new("i-t0"));
        rs.tainted.push(InstanceState::new("i-t1"));
        let ctx = seeded("x.a", rs);

        // A destroyed instance reads back as no state; writing that to the
        // last tainted slot removes the entry.
        let mut scope = EvalScope::new();
        scope.state = None;
        write_state(
            &ctx,
            &mut scope,
            "x.a",
            "x",
            &[],
            StateSink::Tainted { index: None },
        )
        .unwrap();

        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert_eq!(rs.tainted.len(), 1);
            assert_eq!(rs.tainted[0].id, "i-t0");
        });
    }

    #[test]
    fn test_write_state_deposed_sink() {
        let ctx = ctx_with(State::new());
        let mut scope = EvalScope::new();
        scope.state = Some(InstanceState::new("i-old"));
        write_state(&ctx, &mut scope, "x.a", "x", &[], StateSink::Deposed).unwrap();

        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert!(rs.primary.is_none());
            assert_eq!(rs.deposed.as_ref().unwrap().id, "i-old");
        });
    }

    #[test]
    fn test_write_state_tainted_slot_overwrites_at_index() {
        let mut rs = ResourceState::default();
        rs.tainted.push(InstanceState::new("i-t0"));
        let ctx = seeded("x.a", rs);

        let mut scope = EvalScope::new();
        scope.state = Some(InstanceState::new("i-new"));
        write_state(
            &ctx,
            &mut scope,
            "x.a",
            "x",
            &[],
            StateSink::Tainted { index: Some(0) },
        )
        .unwrap();

        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert_eq!(rs.tainted[0].id, "i-new");
        });
    }

    #[test]
    fn test_depose_undepose_steps() {
        let mut rs = ResourceState::default();
        rs.primary = Some(InstanceState::new("i-0"));
        let ctx = seeded("x.a", rs);

        depose_state(&ctx, "x.a").unwrap();
        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert!(rs.primary.is_none());
            assert_eq!(rs.deposed.as_ref().unwrap().id, "i-0");
        });

        undepose_state(&ctx, "x.a").unwrap();
        ctx.with_state_read(|state| {
            let rs = &state.module(&root_module_path()).unwrap().resources["x.a"];
            assert_eq!(rs.primary.as_ref().unwrap().id, "i-0");
            assert!(rs.deposed.is_none());
        });

        // Missing resources are a quiet no-op
        depose_state(&ctx, "x.missing").unwrap();
        undepose_state(&ctx, "x.missing").unwrap();
    }

    #[test]
    fn test_require_state_early_exits_on_empty_id() {
        let mut scope = EvalScope::new();
        assert_eq!(require_state(&mut scope).unwrap(), Flow::EarlyExit);

        scope.state = Some(InstanceState::default());
        assert_eq!(require_state(&mut scope).unwrap(), Flow::EarlyExit);

        scope.state = Some(InstanceState::new("i-0"));
        assert_eq!(require_state(&mut scope).unwrap(), Flow::Continue);
    }
}
