//! Configuration interpolation seam.
//!
//! The engine treats interpolation as a black box: a raw configuration AST
//! plus the resource instance being evaluated go in, a resolved configuration
//! comes out. The real interpolator lives with the configuration layer; this
//! module only defines the contract and a literal pass-through used when no
//! expression support is wired in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Raw configuration as authored, opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConfig {
    /// Unresolved configuration body
    #[serde(default)]
    pub body: Map<String, Value>,
}

impl RawConfig {
    /// Wrap a configuration body.
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body }
    }

    /// A configuration with no attributes.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Configuration after interpolation, ready to hand to a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Resolved attribute values
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

impl ResolvedConfig {
    /// Look up a resolved attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Look up a resolved attribute as a string.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}

/// The resource instance visible to interpolation.
///
/// `count_index` is 0 for single-instance resources, so `count.index`
/// evaluates identically whether or not the resource is replicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    /// Declared resource name
    pub name: String,
    /// Declared resource type
    pub resource_type: String,
    /// Position within the count expansion
    pub count_index: usize,
}

/// Resolves a raw configuration for a specific resource instance.
///
/// Implementations must be deterministic given the same inputs and the same
/// state snapshot.
pub trait Interpolate: Send + Sync {
    /// Resolve `raw` in the context of `resource`.
    fn interpolate(&self, raw: &RawConfig, resource: &InstanceRef) -> Result<ResolvedConfig>;
}

/// Interpolator that resolves every configuration to its literal body.
pub struct LiteralInterpolator;

impl Interpolate for LiteralInterpolator {
    fn interpolate(&self, raw: &RawConfig, _resource: &InstanceRef) -> Result<ResolvedConfig> {
        Ok(ResolvedConfig {
            attrs: raw.body.clone(),
        })
    }
}
