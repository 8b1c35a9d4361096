//! The evaluation tree: leaf steps, combinators, and their interpreter.
//!
//! A vertex's behavior under every walk phase is a single tree of
//! [`EvalNode`] values. Combinators (`Sequence`, `OpFilter`, `If`, `Noop`)
//! compose leaf steps that read and mutate the shared stores through an
//! [`EvalContext`]; steps hand intermediate values to each other through the
//! registers of an [`EvalScope`].
//!
//! Early exit is not an error: a step or predicate may yield
//! [`Flow::EarlyExit`], which cleanly terminates the nearest enclosing
//! `Sequence` and nothing beyond it.

mod apply;
pub mod context;
mod diff;
mod refresh;
mod state;
mod validate;

pub use context::{EvalContext, EvalContextBuilder, EvalScope};

use crate::config::ProvisionerConfig;
use crate::error::Result;
use crate::interpolate::{InstanceRef, RawConfig};
use crate::provider::InstanceInfo;
use crate::walk::WalkPhase;

/// Continuation signal produced by every evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep evaluating the enclosing sequence
    Continue,
    /// Stop the enclosing sequence without error
    EarlyExit,
}

/// Result of evaluating a node.
pub type EvalResult = Result<Flow>;

/// Which diff register a step reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffReg {
    /// The diff as planned
    Saved,
    /// The working diff an apply executes
    Apply,
}

/// How a consumed diff leaves the store.
///
/// A replacement involves two vertices working off one saved diff; the diff
/// must survive until the vertex that runs last has executed its share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffRetire {
    /// Remove the stored diff entirely
    Clear,
    /// Keep only the destroy-only shape; remove when nothing would remain
    KeepDestroy,
    /// Remove the stored diff only if it is a pure destroy
    ClearIfDestroy,
}

/// Which instance slot a state read addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSlot {
    /// The live instance
    Primary,
    /// A tainted instance; `None` addresses the most recent entry
    Tainted(Option<usize>),
    /// The instance set aside by create-before-destroy
    Deposed,
}

/// Where a state write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSink {
    /// Overwrite the primary slot
    Primary,
    /// Overwrite the deposed slot
    Deposed,
    /// Overwrite the tainted entry at `index` (`None` = most recent);
    /// an empty instance removes the entry instead
    Tainted {
        /// Position in the tainted list
        index: Option<usize>,
    },
    /// Route on the scope's tainted flag: append to the tainted list when
    /// set (optionally clearing primary), otherwise write primary
    TaintedFlag {
        /// Also clear the primary slot when the instance is tainted
        clear_primary: bool,
    },
}

/// A node of the evaluation tree.
#[derive(Debug, Clone)]
pub enum EvalNode {
    /// Run children in order; stop on the first error or early exit
    Sequence(Vec<EvalNode>),
    /// Run `node` only when the walk phase is one of `ops`
    OpFilter {
        /// Phases the subtree participates in
        ops: Vec<WalkPhase>,
        /// Gated subtree
        node: Box<EvalNode>,
    },
    /// Branch on a named predicate
    If {
        /// Predicate to evaluate
        cond: Cond,
        /// Branch taken when the predicate holds
        then: Box<EvalNode>,
        /// Branch taken otherwise
        otherwise: Option<Box<EvalNode>>,
    },
    /// Always succeeds
    Noop,

    /// Resolve the raw configuration into the config register
    Interpolate {
        /// Raw configuration to resolve
        raw: RawConfig,
        /// Instance the interpolation runs for
        resource: InstanceRef,
    },
    /// Resolve a provider into the provider register
    GetProvider {
        /// Provider key
        name: String,
    },
    /// Resolve a provisioner into the provisioner register
    GetProvisioner {
        /// Provisioner kind
        kind: String,
    },

    /// Validate the resolved configuration against the provider register
    ValidateResource {
        /// Declared resource type, for diagnostics
        resource_type: String,
        /// Declared resource name, for diagnostics
        name: String,
    },
    /// Validate the resolved configuration against the provisioner register
    ValidateProvisioner {
        /// Provisioner kind, for diagnostics
        kind: String,
    },

    /// Read an instance slot into the state register
    ReadState {
        /// State key
        key: String,
        /// Slot to read
        slot: InstanceSlot,
    },
    /// Write the state register to the store
    WriteState {
        /// State key
        key: String,
        /// Resource type to record
        resource_type: String,
        /// Dependency labels to record
        dependencies: Vec<String>,
        /// Destination slot
        sink: StateSink,
    },
    /// Move primary aside ahead of a create-before-destroy replacement
    DeposeState {
        /// State key
        key: String,
    },
    /// Restore the deposed instance as primary after a failed replacement
    UndeposeState {
        /// State key
        key: String,
    },
    /// Queue the deposed instance for destruction after a successful
    /// replacement
    TaintDeposed {
        /// State key
        key: String,
    },
    /// Early-exit unless the state register holds an instance with an id
    RequireState,
    /// Notify hooks that the shared state changed
    UpdateStateHook,

    /// Refresh the state register through the provider
    Refresh {
        /// Instance identity
        info: InstanceInfo,
    },

    /// Compute a diff from the state and config registers
    Diff {
        /// Instance identity
        info: InstanceInfo,
        /// Register receiving the diff
        into: DiffReg,
        /// Also update the state register with computed-known values
        update_state: bool,
    },
    /// Produce a destroy-only diff into the saved register
    DiffDestroy {
        /// Instance identity
        info: InstanceInfo,
    },
    /// Force the saved diff's destroy flag when tainted instances exist
    DiffTainted {
        /// State key
        key: String,
    },
    /// Fail with a mismatch unless the saved and working diffs agree
    CompareDiff {
        /// Instance identity
        info: InstanceInfo,
    },
    /// Reduce the working diff to its destroy-only shape
    FilterDiff,
    /// Read the stored diff into a register
    ReadDiff {
        /// State key
        key: String,
        /// Register receiving the diff
        into: DiffReg,
    },
    /// Write a register to the diff store, or clear the stored diff
    WriteDiff {
        /// State key
        key: String,
        /// Register to store; `None` clears the saved diff
        from: Option<DiffReg>,
    },
    /// Mark the stored diff consumed once this vertex's share is executed
    RetireDiff {
        /// State key
        key: String,
        /// What, if anything, to leave behind for the paired vertex
        mode: DiffRetire,
    },

    /// Execute the working diff through the provider
    Apply {
        /// Instance identity
        info: InstanceInfo,
        /// Record whether a new instance is being created
        track_create: bool,
    },
    /// Run provisioners against a freshly created instance
    ApplyProvisioners {
        /// Instance identity
        info: InstanceInfo,
        /// Provisioners in declared order
        provisioners: Vec<ProvisionerConfig>,
        /// Instance the provisioner configs interpolate for
        resource: InstanceRef,
    },
    /// Fire the post-apply hook and surface any recorded error
    ApplyPost {
        /// Instance identity
        info: InstanceInfo,
    },
}

/// Named predicates for the `If` combinator.
///
/// The tree stays a pure data structure: every condition the original
/// evaluation plan expressed as an inline closure is named here and
/// evaluated against the scope's registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    /// Apply gate: early-exit when there is no working diff or it is a pure
    /// destroy; otherwise force the working diff's destroy flag off so the
    /// create side never destroys
    DiffRequiresApply,
    /// Depose gate: this apply replaces the instance and the lifecycle asks
    /// for create-before-destroy; records the outcome in the scope
    ReplacementDeposes {
        /// Lifecycle flag from the declaration
        create_before_destroy: bool,
    },
    /// The filtered working diff still calls for a destroy; early-exit
    /// otherwise
    DiffIsDestroy,
    /// A create-before-destroy replacement retired the old primary onto the
    /// tainted list earlier in this walk; plain destroys fall through to
    /// the primary slot
    ReplacementRetired {
        /// State key
        key: String,
        /// Lifecycle flag from the declaration
        create_before_destroy: bool,
    },
    /// Undepose gate: a create-before-destroy replacement failed
    ReplacementFailed,
}

/// What a predicate decided.
enum CondOutcome {
    Branch(bool),
    EarlyExit,
}

impl Cond {
    fn eval(&self, ctx: &EvalContext, scope: &mut EvalScope) -> Result<CondOutcome> {
        match self {
            Cond::DiffRequiresApply => match scope.diff_apply.as_mut() {
                None => Ok(CondOutcome::EarlyExit),
                Some(diff) if diff.is_destroy() => Ok(CondOutcome::EarlyExit),
                Some(diff) => {
                    diff.destroy = false;
                    Ok(CondOutcome::Branch(true))
                }
            },
            Cond::ReplacementDeposes {
                create_before_destroy,
            } => {
                let replacing = scope
                    .diff_apply
                    .as_ref()
                    .map(|d| d.destroy || d.requires_new())
                    .unwrap_or(false);
                scope.create_before_destroy = *create_before_destroy && replacing;
                Ok(CondOutcome::Branch(scope.create_before_destroy))
            }
            Cond::DiffIsDestroy => match &scope.diff_apply {
                Some(diff) if diff.destroy => Ok(CondOutcome::Branch(true)),
                _ => Ok(CondOutcome::EarlyExit),
            },
            Cond::ReplacementRetired {
                key,
                create_before_destroy,
            } => {
                if !create_before_destroy {
                    return Ok(CondOutcome::Branch(false));
                }
                let retired = ctx.with_state_read(|state| {
                    state
                        .module(ctx.path())
                        .and_then(|m| m.resources.get(key))
                        .map(|rs| !rs.tainted.is_empty())
                        .unwrap_or(false)
                });
                Ok(CondOutcome::Branch(retired))
            }
            Cond::ReplacementFailed => {
                if scope.create_before_destroy {
                    scope.tainted = scope.error.is_some();
                }
                let failure = scope.tainted || scope.error.is_some();
                Ok(CondOutcome::Branch(scope.create_before_destroy && failure))
            }
        }
    }
}

/// Evaluate a tree with a fresh scope, discarding the final flow.
pub fn evaluate(node: &EvalNode, ctx: &EvalContext) -> Result<()> {
    let mut scope = EvalScope::new();
    eval(node, ctx, &mut scope).map(|_| ())
}

/// Evaluate one node against a context and scope.
pub fn eval(node: &EvalNode, ctx: &EvalContext, scope: &mut EvalScope) -> EvalResult {
    match node {
        EvalNode::Sequence(children) => {
            for child in children {
                match eval(child, ctx, scope)? {
                    Flow::Continue => {}
                    Flow::EarlyExit => {
                        log::debug!("eval: early exit, ending sequence");
                        break;
                    }
                }
            }
            Ok(Flow::Continue)
        }
        EvalNode::OpFilter { ops, node } => {
            if ops.contains(&ctx.phase()) {
                eval(node, ctx, scope)
            } else {
                Ok(Flow::Continue)
            }
        }
        EvalNode::If {
            cond,
            then,
            otherwise,
        } => match cond.eval(ctx, scope)? {
            CondOutcome::EarlyExit => Ok(Flow::EarlyExit),
            CondOutcome::Branch(true) => eval(then, ctx, scope),
            CondOutcome::Branch(false) => match otherwise {
                Some(node) => eval(node, ctx, scope),
                None => Ok(Flow::Continue),
            },
        },
        EvalNode::Noop => Ok(Flow::Continue),

        EvalNode::Interpolate { raw, resource } => {
            scope.config = Some(ctx.interpolate(raw, resource)?);
            Ok(Flow::Continue)
        }
        EvalNode::GetProvider { name } => {
            scope.provider = Some(ctx.provider(name)?);
            Ok(Flow::Continue)
        }
        EvalNode::GetProvisioner { kind } => {
            scope.provisioner = Some(ctx.provisioner(kind)?);
            Ok(Flow::Continue)
        }

        EvalNode::ValidateResource {
            resource_type,
            name,
        } => validate::validate_resource(ctx, scope, resource_type, name),
        EvalNode::ValidateProvisioner { kind } => validate::validate_provisioner(ctx, scope, kind),

        EvalNode::ReadState { key, slot } => state::read_state(ctx, scope, key, *slot),
        EvalNode::WriteState {
            key,
            resource_type,
            dependencies,
            sink,
        } => state::write_state(ctx, scope, key, resource_type, dependencies, *sink),
        EvalNode::DeposeState { key } => state::depose_state(ctx, key),
        EvalNode::UndeposeState { key } => state::undepose_state(ctx, key),
        EvalNode::TaintDeposed { key } => state::taint_deposed(ctx, key),
        EvalNode::RequireState => state::require_state(scope),
        EvalNode::UpdateStateHook => state::update_state_hook(ctx),

        EvalNode::Refresh { info } => refresh::refresh(scope, info),

        EvalNode::Diff {
            info,
            into,
            update_state,
        } => diff::diff(scope, info, *into, *update_state),
        EvalNode::DiffDestroy { info } => diff::diff_destroy(scope, info),
        EvalNode::DiffTainted { key } => diff::diff_tainted(ctx, scope, key),
        EvalNode::CompareDiff { info } => diff::compare_diff(scope, info),
        EvalNode::FilterDiff => diff::filter_diff(scope),
        EvalNode::ReadDiff { key, into } => diff::read_diff(ctx, scope, key, *into),
        EvalNode::WriteDiff { key, from } => diff::write_diff(ctx, scope, key, *from),
        EvalNode::RetireDiff { key, mode } => diff::retire_diff(ctx, key, *mode),

        EvalNode::Apply { info, track_create } => apply::apply(scope, info, *track_create),
        EvalNode::ApplyProvisioners {
            info,
            provisioners,
            resource,
        } => apply::apply_provisioners(ctx, scope, info, provisioners, resource),
        EvalNode::ApplyPost { info } => apply::apply_post(ctx, scope, info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::InstanceDiff;

    fn build_ctx(phase: WalkPhase) -> EvalContext {
        EvalContext::builder(phase).build()
    }

    #[test]
    fn test_sequence_consumes_early_exit() {
        // RequireState early-exits on an empty register; the enclosing
        // sequence must terminate cleanly rather than error.
        let tree = EvalNode::Sequence(vec![EvalNode::RequireState, EvalNode::Noop]);
        let ctx = build_ctx(WalkPhase::Apply);
        let mut scope = EvalScope::new();
        assert_eq!(eval(&tree, &ctx, &mut scope).unwrap(), Flow::Continue);
    }

    #[test]
    fn test_early_exit_stops_only_nearest_sequence() {
        // The inner sequence early-exits; the outer sequence keeps going and
        // its later step still runs.
        let inner = EvalNode::Sequence(vec![EvalNode::RequireState]);
        let later = EvalNode::ReadDiff {
            key: "x.a".to_string(),
            into: DiffReg::Apply,
        };
        let tree = EvalNode::Sequence(vec![inner, later]);

        let ctx = build_ctx(WalkPhase::Apply);
        ctx.with_diffs_write(|diffs| {
            diffs
                .add_module(&crate::state::root_module_path())
                .diffs
                .insert("x.a".to_string(), InstanceDiff::for_destroy());
        });

        let mut scope = EvalScope::new();
        eval(&tree, &ctx, &mut scope).unwrap();
        assert!(scope.diff_apply.is_some());
    }

    #[test]
    fn test_op_filter_skips_other_phases() {
        let tree = EvalNode::OpFilter {
            ops: vec![WalkPhase::Plan],
            node: Box::new(EvalNode::GetProvider {
                name: "aws".to_string(),
            }),
        };

        // No provider registered: evaluating the child would fail, so the
        // filter skipping it is observable.
        let ctx = build_ctx(WalkPhase::Refresh);
        let mut scope = EvalScope::new();
        assert_eq!(eval(&tree, &ctx, &mut scope).unwrap(), Flow::Continue);

        let ctx = build_ctx(WalkPhase::Plan);
        let mut scope = EvalScope::new();
        assert!(eval(&tree, &ctx, &mut scope).is_err());
    }

    #[test]
    fn test_if_early_exit_propagates_to_sequence() {
        // A missing working diff early-exits the apply gate; steps after the
        // gate must not run.
        let tree = EvalNode::Sequence(vec![
            EvalNode::If {
                cond: Cond::DiffRequiresApply,
                then: Box::new(EvalNode::Noop),
                otherwise: None,
            },
            EvalNode::GetProvider {
                name: "missing".to_string(),
            },
        ]);
        let ctx = build_ctx(WalkPhase::Apply);
        let mut scope = EvalScope::new();
        assert_eq!(eval(&tree, &ctx, &mut scope).unwrap(), Flow::Continue);
    }

    #[test]
    fn test_diff_requires_apply_forces_destroy_off() {
        let mut scope = EvalScope::new();
        let mut diff = InstanceDiff::for_destroy();
        diff.attributes.insert(
            "ami".to_string(),
            crate::diff::AttributeDiff::update("a", "b"),
        );
        scope.diff_apply = Some(diff);

        let tree = EvalNode::If {
            cond: Cond::DiffRequiresApply,
            then: Box::new(EvalNode::Noop),
            otherwise: None,
        };
        let ctx = build_ctx(WalkPhase::Apply);
        assert_eq!(eval(&tree, &ctx, &mut scope).unwrap(), Flow::Continue);
        assert!(!scope.diff_apply.as_ref().unwrap().destroy);
    }

    #[test]
    fn test_pure_destroy_early_exits_apply_gate() {
        let mut scope = EvalScope::new();
        scope.diff_apply = Some(InstanceDiff::for_destroy());

        let tree = EvalNode::If {
            cond: Cond::DiffRequiresApply,
            then: Box::new(EvalNode::Noop),
            otherwise: None,
        };
        let ctx = build_ctx(WalkPhase::Apply);
        assert_eq!(eval(&tree, &ctx, &mut scope).unwrap(), Flow::EarlyExit);
    }
}
