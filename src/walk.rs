//! Walk phases selecting which evaluation subtrees execute.

use serde::{Deserialize, Serialize};

/// The phase a graph walk runs under.
///
/// Phases are disjoint: a node's evaluation tree gates each phase-specific
/// subsequence behind an op filter, so at most one fires per walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkPhase {
    /// Check declarations and provisioner configurations against providers
    Validate,
    /// Reconcile recorded state with the real infrastructure
    Refresh,
    /// Compute and save the diffs a later apply will execute
    Plan,
    /// Compute destroy-only diffs for every known instance
    PlanDestroy,
    /// Execute saved diffs against providers and persist the outcome
    Apply,
}

impl WalkPhase {
    /// Name used in logs and walk configuration.
    pub fn directive(&self) -> &'static str {
        match self {
            WalkPhase::Validate => "validate",
            WalkPhase::Refresh => "refresh",
            WalkPhase::Plan => "plan",
            WalkPhase::PlanDestroy => "plan_destroy",
            WalkPhase::Apply => "apply",
        }
    }

    /// Parse a walk phase from its directive name.
    ///
    /// Unknown directives yield `None`; callers treat that as a walk that
    /// runs no filtered subtree at all.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validate" => Some(WalkPhase::Validate),
            "refresh" => Some(WalkPhase::Refresh),
            "plan" => Some(WalkPhase::Plan),
            "plan_destroy" => Some(WalkPhase::PlanDestroy),
            "apply" => Some(WalkPhase::Apply),
            _ => None,
        }
    }
}

impl std::fmt::Display for WalkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.directive())
    }
}
