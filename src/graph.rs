//! The contract this core consumes from the dependency-graph library.
//!
//! Expansion only needs two operations: add a vertex, then let the graph
//! attach inbound edges by matching the vertex's declared dependencies
//! against labels other vertices publish.

use std::sync::Arc;

use crate::eval::EvalNode;

/// A graph vertex produced by resource expansion.
pub trait Vertex: Send + Sync {
    /// Human-readable vertex name.
    fn name(&self) -> String;

    /// Labels other vertices may declare dependencies on.
    fn dependable_names(&self) -> Vec<String>;

    /// Labels this vertex depends on.
    fn depends_on(&self) -> Vec<String>;

    /// Key of the provider this vertex needs.
    fn provided_by(&self) -> String;

    /// Build the evaluation tree a walker runs for this vertex.
    fn eval_tree(&self) -> EvalNode;
}

/// Mutable view of the dependency graph during a transform pass.
pub trait Graph {
    /// Add a vertex.
    fn add(&mut self, vertex: Arc<dyn Vertex>);

    /// Attach inbound edges from vertices whose published labels match
    /// `vertex`'s declared dependencies.
    ///
    /// Missing dependencies are ignored here; they are caught by an earlier
    /// validation pass.
    fn connect_dependent(&mut self, vertex: &dyn Vertex);
}
