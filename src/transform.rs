//! Graph pass that expands a resource's count into per-index vertices.

use std::sync::Arc;

use crate::config::ResourceConfig;
use crate::error::Result;
use crate::graph::{Graph, Vertex};
use crate::node::{ResourceDestroyNode, ResourceNode};

/// Expands one declared resource into its count-indexed vertices and wires
/// their dependencies.
pub struct CountExpander {
    /// Declaration to expand
    pub resource: Arc<ResourceConfig>,
    /// Produce destroy-variant vertices instead of create-side ones
    pub destroy: bool,
}

impl CountExpander {
    /// Expand into `graph`.
    ///
    /// Adds one vertex per count index (none at all for count 0), then
    /// connects dependents once every vertex is present so intra-resource
    /// references resolve. A count of 1 yields a single vertex whose state
    /// key carries no index suffix.
    pub fn transform(&self, graph: &mut dyn Graph) -> Result<()> {
        let count = self.resource.count()?;
        log::debug!(
            "expanding {} into {} vertices (destroy: {})",
            self.resource.id(),
            count,
            self.destroy
        );

        let mut vertices: Vec<Arc<dyn Vertex>> = Vec::with_capacity(count);
        for i in 0..count {
            let index = if count == 1 { None } else { Some(i) };
            let node = ResourceNode::new(Arc::clone(&self.resource), index);
            let vertex: Arc<dyn Vertex> = if self.destroy {
                Arc::new(ResourceDestroyNode::new(node))
            } else {
                Arc::new(node)
            };
            graph.add(Arc::clone(&vertex));
            vertices.push(vertex);
        }

        for vertex in &vertices {
            graph.connect_dependent(vertex.as_ref());
        }

        Ok(())
    }
}
