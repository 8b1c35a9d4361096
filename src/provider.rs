//! Provider and provisioner seams.
//!
//! Providers own the real infrastructure operations; provisioners run
//! post-create configuration on a freshly built instance. Both arrive over a
//! plugin transport that is out of scope here, so the engine only sees these
//! traits.

use serde::{Deserialize, Serialize};

use crate::diff::InstanceDiff;
use crate::error::Result;
use crate::interpolate::ResolvedConfig;
use crate::state::InstanceState;

/// Identity of a resource instance as seen by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// State key of the instance (`type.name` or `type.name.index`)
    pub id: String,
    /// Resource type the provider operates on
    pub resource_type: String,
}

/// Severity of a validation diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth surfacing, does not block a walk
    Warning,
    /// Blocks the walk once the validate phase completes
    Error,
}

/// A single finding from validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// How severe the finding is
    pub severity: Severity,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// A warning-level diagnostic.
    pub fn warning(message: &str) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.to_string(),
        }
    }

    /// An error-level diagnostic.
    pub fn error(message: &str) -> Self {
        Self {
            severity: Severity::Error,
            message: message.to_string(),
        }
    }

    /// Whether this diagnostic blocks the walk.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Derive the provider key for a resource type.
///
/// The key is the prefix of the type before the first underscore:
/// `aws_instance` is served by the `aws` provider.
pub fn provider_for_type(resource_type: &str) -> &str {
    match resource_type.find('_') {
        Some(idx) => &resource_type[..idx],
        None => resource_type,
    }
}

/// Infrastructure operations for one provider plugin.
pub trait Provider: Send + Sync {
    /// Check a resolved configuration without touching infrastructure.
    fn validate(&self, config: &ResolvedConfig) -> Vec<Diagnostic>;

    /// Reconcile a recorded instance with the real infrastructure.
    ///
    /// Returns the instance as it exists now; `None` means it is gone.
    fn refresh(
        &self,
        info: &InstanceInfo,
        state: Option<&InstanceState>,
    ) -> Result<Option<InstanceState>>;

    /// Compute the changes needed to reconcile `state` with `config`.
    ///
    /// Also returns the state with any computed-known values filled in, for
    /// writing back during plan. A `None` diff means nothing to do.
    fn diff(
        &self,
        info: &InstanceInfo,
        state: Option<&InstanceState>,
        config: &ResolvedConfig,
    ) -> Result<(Option<InstanceDiff>, Option<InstanceState>)>;

    /// Execute a diff, returning the instance as it exists afterwards.
    ///
    /// A destroy diff yields `None`.
    fn apply(
        &self,
        info: &InstanceInfo,
        state: Option<&InstanceState>,
        diff: &InstanceDiff,
    ) -> Result<Option<InstanceState>>;
}

/// Post-create configuration for one provisioner plugin.
pub trait Provisioner: Send + Sync {
    /// Check a resolved provisioner configuration.
    fn validate(&self, config: &ResolvedConfig) -> Vec<Diagnostic>;

    /// Run against a freshly created instance.
    fn apply(
        &self,
        info: &InstanceInfo,
        state: &InstanceState,
        config: &ResolvedConfig,
    ) -> Result<()>;
}
