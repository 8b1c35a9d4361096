//! Steps that validate configurations without touching infrastructure.
//!
//! Findings accumulate on the context so every declaration and provisioner
//! gets validated even after earlier ones produced errors; the walker reads
//! the full report once the validate walk completes.

use super::context::{EvalContext, EvalScope};
use super::{EvalResult, Flow};
use crate::error::Error;
use crate::provider::provider_for_type;

/// Validate the resolved configuration against the provider register.
pub(super) fn validate_resource(
    ctx: &EvalContext,
    scope: &mut EvalScope,
    resource_type: &str,
    name: &str,
) -> EvalResult {
    let provider = scope
        .provider
        .clone()
        .ok_or_else(|| Error::UnknownProvider(provider_for_type(resource_type).to_string()))?;
    let config = scope.config.clone().unwrap_or_default();

    let mut diagnostics = provider.validate(&config);
    for d in &mut diagnostics {
        d.message = format!("{}.{}: {}", resource_type, name, d.message);
    }
    ctx.push_diagnostics(diagnostics);
    Ok(Flow::Continue)
}

/// Validate the resolved configuration against the provisioner register.
pub(super) fn validate_provisioner(
    ctx: &EvalContext,
    scope: &mut EvalScope,
    kind: &str,
) -> EvalResult {
    let provisioner = scope
        .provisioner
        .clone()
        .ok_or_else(|| Error::UnknownProvisioner(kind.to_string()))?;
    let config = scope.config.clone().unwrap_or_default();

    let mut diagnostics = provisioner.validate(&config);
    for d in &mut diagnostics {
        d.message = format!("provisioner {}: {}", kind, d.message);
    }
    ctx.push_diagnostics(diagnostics);
    Ok(Flow::Continue)
}
