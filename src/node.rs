//! Count-expanded resource vertices and their evaluation trees.
//!
//! Every declared resource becomes one [`ResourceNode`] per count index
//! (plus a [`ResourceDestroyNode`] wrapper on destroy walks). A node builds
//! a single evaluation tree covering every walk phase; op filters make sure
//! only the subsequence for the running phase fires.

use std::sync::Arc;

use crate::config::ResourceConfig;
use crate::eval::{Cond, DiffReg, DiffRetire, EvalNode, InstanceSlot, StateSink};
use crate::graph::Vertex;
use crate::interpolate::InstanceRef;
use crate::provider::{provider_for_type, InstanceInfo};
use crate::walk::WalkPhase;

/// A single expanded instance of a declared resource.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    resource: Arc<ResourceConfig>,
    index: Option<usize>,
}

impl ResourceNode {
    /// A vertex for `resource` at `index`.
    ///
    /// `None` is the single-instance convention: the state key carries no
    /// numeric suffix and interpolation sees count index 0.
    pub fn new(resource: Arc<ResourceConfig>, index: Option<usize>) -> Self {
        Self { resource, index }
    }

    /// The declaration this vertex was expanded from.
    pub fn resource(&self) -> &ResourceConfig {
        &self.resource
    }

    /// Position within the count expansion.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The key this instance's state and diff are stored under.
    pub fn state_key(&self) -> String {
        match self.index {
            None => self.resource.id(),
            Some(i) => format!("{}.{}", self.resource.id(), i),
        }
    }

    fn instance_info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.state_key(),
            resource_type: self.resource.resource_type.clone(),
        }
    }

    fn instance_ref(&self) -> InstanceRef {
        InstanceRef {
            name: self.resource.name.clone(),
            resource_type: self.resource.resource_type.clone(),
            count_index: self.index.unwrap_or(0),
        }
    }

    fn write_primary(&self) -> EvalNode {
        EvalNode::WriteState {
            key: self.state_key(),
            resource_type: self.resource.resource_type.clone(),
            dependencies: self.depends_on(),
            sink: StateSink::Primary,
        }
    }
}

impl Vertex for ResourceNode {
    fn name(&self) -> String {
        match self.index {
            None => self.resource.id(),
            Some(i) => format!("{} #{}", self.resource.id(), i),
        }
    }

    fn dependable_names(&self) -> Vec<String> {
        let id = self.resource.id();
        let key = self.state_key();
        if key == id {
            vec![id]
        } else {
            vec![id, key]
        }
    }

    fn depends_on(&self) -> Vec<String> {
        self.resource.depends_on.clone()
    }

    fn provided_by(&self) -> String {
        provider_for_type(&self.resource.resource_type).to_string()
    }

    fn eval_tree(&self) -> EvalNode {
        let resource = self.instance_ref();
        let info = self.instance_info();
        let key = self.state_key();
        let provider = self.provided_by();
        let create_before_destroy = self.resource.lifecycle.create_before_destroy;

        let mut seq = Vec::with_capacity(5);

        // Validate the resource, then each of its provisioners. Findings
        // accumulate on the context so one bad block doesn't hide the rest.
        let mut vseq = vec![
            EvalNode::GetProvider {
                name: provider.clone(),
            },
            EvalNode::Interpolate {
                raw: self.resource.raw.clone(),
                resource: resource.clone(),
            },
            EvalNode::ValidateResource {
                resource_type: self.resource.resource_type.clone(),
                name: self.resource.name.clone(),
            },
        ];
        for p in &self.resource.provisioners {
            vseq.push(EvalNode::GetProvisioner {
                kind: p.kind.clone(),
            });
            vseq.push(EvalNode::Interpolate {
                raw: p.raw.clone(),
                resource: resource.clone(),
            });
            vseq.push(EvalNode::ValidateProvisioner {
                kind: p.kind.clone(),
            });
        }
        seq.push(EvalNode::OpFilter {
            ops: vec![WalkPhase::Validate],
            node: Box::new(EvalNode::Sequence(vseq)),
        });

        // Refresh the primary against the real infrastructure.
        seq.push(EvalNode::OpFilter {
            ops: vec![WalkPhase::Refresh],
            node: Box::new(EvalNode::Sequence(vec![
                EvalNode::GetProvider {
                    name: provider.clone(),
                },
                EvalNode::ReadState {
                    key: key.clone(),
                    slot: InstanceSlot::Primary,
                },
                EvalNode::Refresh { info: info.clone() },
                self.write_primary(),
            ])),
        });

        // Diff the resource and save the result for apply.
        seq.push(EvalNode::OpFilter {
            ops: vec![WalkPhase::Plan],
            node: Box::new(EvalNode::Sequence(vec![
                EvalNode::Interpolate {
                    raw: self.resource.raw.clone(),
                    resource: resource.clone(),
                },
                EvalNode::GetProvider {
                    name: provider.clone(),
                },
                EvalNode::ReadState {
                    key: key.clone(),
                    slot: InstanceSlot::Primary,
                },
                EvalNode::Diff {
                    info: info.clone(),
                    into: DiffReg::Saved,
                    update_state: true,
                },
                self.write_primary(),
                EvalNode::DiffTainted { key: key.clone() },
                EvalNode::WriteDiff {
                    key: key.clone(),
                    from: Some(DiffReg::Saved),
                },
            ])),
        });

        // Diff the resource for destruction.
        seq.push(EvalNode::OpFilter {
            ops: vec![WalkPhase::PlanDestroy],
            node: Box::new(EvalNode::Sequence(vec![
                EvalNode::ReadState {
                    key: key.clone(),
                    slot: InstanceSlot::Primary,
                },
                EvalNode::DiffDestroy { info: info.clone() },
                EvalNode::WriteDiff {
                    key: key.clone(),
                    from: Some(DiffReg::Saved),
                },
            ])),
        });

        // Apply. Destruction is never done here: this side builds, the
        // destroy-variant vertex tears down.
        seq.push(EvalNode::OpFilter {
            ops: vec![WalkPhase::Apply],
            node: Box::new(EvalNode::Sequence(vec![
                EvalNode::ReadDiff {
                    key: key.clone(),
                    into: DiffReg::Apply,
                },
                EvalNode::If {
                    cond: Cond::DiffRequiresApply,
                    then: Box::new(EvalNode::Noop),
                    otherwise: None,
                },
                EvalNode::If {
                    cond: Cond::ReplacementDeposes {
                        create_before_destroy,
                    },
                    then: Box::new(EvalNode::DeposeState { key: key.clone() }),
                    otherwise: None,
                },
                // Re-interpolate after the depose so self-references see
                // the instance being built, not the old primary.
                EvalNode::Interpolate {
                    raw: self.resource.raw.clone(),
                    resource: resource.clone(),
                },
                EvalNode::GetProvider {
                    name: provider.clone(),
                },
                EvalNode::ReadState {
                    key: key.clone(),
                    slot: InstanceSlot::Primary,
                },
                // The authoritative diff: recomputed now, then checked
                // against the plan so a drifted world refuses to apply.
                EvalNode::Diff {
                    info: info.clone(),
                    into: DiffReg::Apply,
                    update_state: false,
                },
                EvalNode::ReadDiff {
                    key: key.clone(),
                    into: DiffReg::Saved,
                },
                EvalNode::CompareDiff { info: info.clone() },
                EvalNode::GetProvider {
                    name: provider.clone(),
                },
                EvalNode::ReadState {
                    key: key.clone(),
                    slot: InstanceSlot::Primary,
                },
                EvalNode::Apply {
                    info: info.clone(),
                    track_create: true,
                },
                self.write_primary(),
                EvalNode::ApplyProvisioners {
                    info: info.clone(),
                    provisioners: self.resource.provisioners.clone(),
                    resource: resource.clone(),
                },
                EvalNode::If {
                    cond: Cond::ReplacementFailed,
                    then: Box::new(EvalNode::UndeposeState { key: key.clone() }),
                    otherwise: Some(Box::new(EvalNode::TaintDeposed { key: key.clone() })),
                },
                EvalNode::RetireDiff {
                    key: key.clone(),
                    mode: if create_before_destroy {
                        DiffRetire::KeepDestroy
                    } else {
                        DiffRetire::Clear
                    },
                },
                EvalNode::WriteState {
                    key: key.clone(),
                    resource_type: self.resource.resource_type.clone(),
                    dependencies: self.depends_on(),
                    sink: StateSink::TaintedFlag {
                        clear_primary: !create_before_destroy,
                    },
                },
                EvalNode::ApplyPost { info: info.clone() },
                EvalNode::UpdateStateHook,
            ])),
        });

        EvalNode::Sequence(seq)
    }
}

/// The destroy side of an expanded resource.
///
/// Wraps the normal vertex; its tree only participates in apply walks and
/// only executes the destroy shape of the saved diff. The transformer
/// orders it after its create twin under create-before-destroy and before
/// it otherwise.
#[derive(Debug, Clone)]
pub struct ResourceDestroyNode {
    inner: ResourceNode,
}

impl ResourceDestroyNode {
    /// Wrap a resource vertex for destruction.
    pub fn new(inner: ResourceNode) -> Self {
        Self { inner }
    }

    /// The wrapped create-side vertex.
    pub fn inner(&self) -> &ResourceNode {
        &self.inner
    }
}

impl Vertex for ResourceDestroyNode {
    fn name(&self) -> String {
        format!("{} (destroy)", self.inner.name())
    }

    fn dependable_names(&self) -> Vec<String> {
        self.inner.dependable_names()
    }

    fn depends_on(&self) -> Vec<String> {
        self.inner.depends_on()
    }

    fn provided_by(&self) -> String {
        self.inner.provided_by()
    }

    fn eval_tree(&self) -> EvalNode {
        let info = self.inner.instance_info();
        let key = self.inner.state_key();
        let create_before_destroy = self.inner.resource.lifecycle.create_before_destroy;

        // Under create-before-destroy the replacement has already run and
        // retired the old primary onto the tainted list; that entry is the
        // destroy target and this vertex runs last, so it also retires the
        // saved diff. Otherwise the primary is destroyed first and the
        // saved diff must survive for the create vertex unless it was a
        // pure destroy.
        let read_target = EvalNode::If {
            cond: Cond::ReplacementRetired {
                key: key.clone(),
                create_before_destroy,
            },
            then: Box::new(EvalNode::ReadState {
                key: key.clone(),
                slot: InstanceSlot::Tainted(None),
            }),
            otherwise: Some(Box::new(EvalNode::ReadState {
                key: key.clone(),
                slot: InstanceSlot::Primary,
            })),
        };
        let write_target = EvalNode::If {
            cond: Cond::ReplacementRetired {
                key: key.clone(),
                create_before_destroy,
            },
            then: Box::new(EvalNode::WriteState {
                key: key.clone(),
                resource_type: self.inner.resource.resource_type.clone(),
                dependencies: self.inner.depends_on(),
                sink: StateSink::Tainted { index: None },
            }),
            otherwise: Some(Box::new(EvalNode::WriteState {
                key: key.clone(),
                resource_type: self.inner.resource.resource_type.clone(),
                dependencies: self.inner.depends_on(),
                sink: StateSink::Primary,
            })),
        };

        EvalNode::OpFilter {
            ops: vec![WalkPhase::Apply],
            node: Box::new(EvalNode::Sequence(vec![
                EvalNode::ReadDiff {
                    key: key.clone(),
                    into: DiffReg::Apply,
                },
                EvalNode::FilterDiff,
                EvalNode::If {
                    cond: Cond::DiffIsDestroy,
                    then: Box::new(EvalNode::Noop),
                    otherwise: None,
                },
                EvalNode::GetProvider {
                    name: self.inner.provided_by(),
                },
                read_target,
                EvalNode::RequireState,
                EvalNode::Apply {
                    info: info.clone(),
                    track_create: false,
                },
                write_target,
                EvalNode::RetireDiff {
                    key,
                    mode: if create_before_destroy {
                        DiffRetire::Clear
                    } else {
                        DiffRetire::ClearIfDestroy
                    },
                },
                EvalNode::ApplyPost { info },
            ])),
        }
    }
}
