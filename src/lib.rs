//! # groundwork
//!
//! Resource evaluation core for a declarative infrastructure engine.
//!
//! This crate turns a declared resource (replication count, lifecycle
//! policy, provisioners) into graph vertices and walk-filtered evaluation
//! trees that validate, refresh, plan and apply the resource against a
//! pluggable provider, persisting outcomes to a shared state store:
//!
//! - [`transform::CountExpander`] materializes one vertex per count index
//!   and wires dependency edges
//! - [`node::ResourceNode`] (and its destroy variant) builds the evaluation
//!   tree for every walk phase, including the create-before-destroy
//!   replacement dance and tainted-instance bookkeeping
//! - [`eval`] holds the step set, the combinators, and their interpreter
//! - [`state`] and [`diff`] are the shared, lock-protected stores walks
//!   read and mutate
//!
//! Providers, provisioners, interpolation, and the dependency-graph library
//! stay behind the seams in [`provider`], [`interpolate`], and [`graph`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use groundwork::config::ResourceConfig;
//! use groundwork::eval::{evaluate, EvalContext};
//! use groundwork::graph::Vertex;
//! use groundwork::node::ResourceNode;
//! use groundwork::walk::WalkPhase;
//!
//! let mut resource = ResourceConfig::new("aws_instance", "web");
//! resource.count = 3;
//!
//! // One vertex per index; a walker would run these from a graph.
//! let node = ResourceNode::new(Arc::new(resource), Some(0));
//! let ctx = EvalContext::builder(WalkPhase::Plan).build();
//! evaluate(&node.eval_tree(), &ctx)?;
//! # Ok::<(), groundwork::error::Error>(())
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod eval;
pub mod graph;
pub mod hook;
pub mod interpolate;
pub mod node;
pub mod provider;
pub mod state;
pub mod transform;
pub mod walk;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::config::{Lifecycle, ProvisionerConfig, ResourceConfig};
pub use crate::diff::{AttributeDiff, DiffStore, InstanceDiff};
pub use crate::error::{Error, Result};
pub use crate::eval::{evaluate, EvalContext, EvalNode, EvalScope, Flow};
pub use crate::graph::{Graph, Vertex};
pub use crate::hook::{Hook, HookAction};
pub use crate::interpolate::{InstanceRef, Interpolate, RawConfig, ResolvedConfig};
pub use crate::node::{ResourceDestroyNode, ResourceNode};
pub use crate::provider::{Diagnostic, InstanceInfo, Provider, Provisioner, Severity};
pub use crate::state::{InstanceState, ResourceState, State};
pub use crate::transform::CountExpander;
pub use crate::walk::WalkPhase;
