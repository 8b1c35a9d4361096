//! Resource declarations as handed over by the configuration layer.
//!
//! Declarations are immutable once parsed; the engine only reads them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interpolate::RawConfig;

/// Lifecycle policy attached to a resource declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Build the replacement before tearing down the old instance
    #[serde(default)]
    pub create_before_destroy: bool,
}

/// A provisioner attached to a resource declaration.
///
/// Provisioners run in declared order against freshly created instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Provisioner kind (e.g. "shell")
    pub kind: String,
    /// Raw configuration, interpolated per instance before each run
    #[serde(default)]
    pub raw: RawConfig,
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g. "aws_instance")
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name within its type
    pub name: String,
    /// Evaluated replication count; negative values are rejected at expansion
    #[serde(default = "default_count")]
    pub count: i64,
    /// Raw configuration body
    #[serde(default)]
    pub raw: RawConfig,
    /// Lifecycle policy
    #[serde(default)]
    pub lifecycle: Lifecycle,
    /// Provisioners to run after create, in order
    #[serde(default)]
    pub provisioners: Vec<ProvisionerConfig>,
    /// Explicit dependency labels
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_count() -> i64 {
    1
}

impl ResourceConfig {
    /// A declaration with the given type and name, count 1 and no
    /// configuration.
    pub fn new(resource_type: &str, name: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            count: 1,
            raw: RawConfig::empty(),
            lifecycle: Lifecycle::default(),
            provisioners: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Aggregate identity, `type.name`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// Validated replication count.
    pub fn count(&self) -> Result<usize> {
        if self.count < 0 {
            return Err(Error::InvalidCount(self.count));
        }
        Ok(self.count as usize)
    }
}
