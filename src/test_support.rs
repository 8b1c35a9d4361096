//! Deterministic collaborators for engine tests.
//!
//! The mock provider derives diffs by comparing the resolved configuration
//! against recorded attributes, so plan and apply see identical results for
//! identical inputs. Every call is recorded for assertions about which
//! operations ran.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::diff::{AttributeDiff, InstanceDiff};
use crate::error::{Error, Result};
use crate::graph::{Graph, Vertex};
use crate::hook::{Hook, HookAction};
use crate::interpolate::{RawConfig, ResolvedConfig};
use crate::provider::{Diagnostic, InstanceInfo, Provider, Provisioner};
use crate::state::{InstanceState, State};

/// Build a raw configuration from string attributes.
pub fn raw_config(attrs: &[(&str, &str)]) -> RawConfig {
    let mut body = serde_json::Map::new();
    for (key, value) in attrs {
        body.insert(key.to_string(), Value::String(value.to_string()));
    }
    RawConfig::new(body)
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Provider that reconciles recorded attributes against configuration.
pub struct MockProvider {
    create_id: String,
    requires_new_keys: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    fail_apply: Option<String>,
    refresh_override: Mutex<Option<Option<InstanceState>>>,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    /// A provider whose creates produce instances with `create_id`.
    pub fn new(create_id: &str) -> Self {
        Self {
            create_id: create_id.to_string(),
            requires_new_keys: Vec::new(),
            diagnostics: Vec::new(),
            fail_apply: None,
            refresh_override: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Changing `key` forces a replacement.
    pub fn requires_new(mut self, key: &str) -> Self {
        self.requires_new_keys.push(key.to_string());
        self
    }

    /// Validate returns `diagnostic`.
    pub fn diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Every apply fails with `message`.
    pub fn fail_apply(mut self, message: &str) -> Self {
        self.fail_apply = Some(message.to_string());
        self
    }

    /// The next refresh returns `state` instead of echoing its input.
    pub fn refresh_returns(&self, state: Option<InstanceState>) {
        *self.refresh_override.lock().unwrap() = Some(state);
    }

    /// Operations invoked so far, e.g. `"apply x.a"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Provider for MockProvider {
    fn validate(&self, _config: &ResolvedConfig) -> Vec<Diagnostic> {
        self.record("validate".to_string());
        self.diagnostics.clone()
    }

    fn refresh(
        &self,
        info: &InstanceInfo,
        state: Option<&InstanceState>,
    ) -> Result<Option<InstanceState>> {
        self.record(format!("refresh {}", info.id));
        if let Some(next) = self.refresh_override.lock().unwrap().take() {
            return Ok(next);
        }
        Ok(state.cloned())
    }

    fn diff(
        &self,
        info: &InstanceInfo,
        state: Option<&InstanceState>,
        config: &ResolvedConfig,
    ) -> Result<(Option<InstanceDiff>, Option<InstanceState>)> {
        self.record(format!("diff {}", info.id));
        let missing = state.map(|s| s.is_empty()).unwrap_or(true);

        let mut attributes = HashMap::new();
        for (key, value) in &config.attrs {
            let new = value_string(value);
            let old = state
                .and_then(|s| s.attributes.get(key))
                .cloned()
                .unwrap_or_default();
            if missing || old != new {
                attributes.insert(
                    key.clone(),
                    AttributeDiff {
                        old,
                        new,
                        requires_new: self.requires_new_keys.contains(key),
                        new_computed: false,
                    },
                );
            }
        }

        if attributes.is_empty() {
            return Ok((None, state.cloned()));
        }
        Ok((
            Some(InstanceDiff {
                destroy: false,
                attributes,
            }),
            state.cloned(),
        ))
    }

    fn apply(
        &self,
        info: &InstanceInfo,
        state: Option<&InstanceState>,
        diff: &InstanceDiff,
    ) -> Result<Option<InstanceState>> {
        self.record(format!("apply {}", info.id));
        if let Some(message) = &self.fail_apply {
            return Err(Error::Provider {
                key: info.id.clone(),
                message: message.clone(),
            });
        }
        if diff.is_destroy() {
            return Ok(None);
        }

        let missing = state.map(|s| s.is_empty()).unwrap_or(true);
        let mut instance = if missing || diff.requires_new() {
            InstanceState::new(&self.create_id)
        } else {
            state.cloned().unwrap_or_else(|| InstanceState::new(&self.create_id))
        };
        for (key, attr) in &diff.attributes {
            instance.attributes.insert(key.clone(), attr.new.clone());
        }
        Ok(Some(instance))
    }
}

/// Provisioner with scripted diagnostics and an optional failure.
pub struct MockProvisioner {
    kind: String,
    diagnostics: Vec<Diagnostic>,
    fail: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockProvisioner {
    /// A provisioner of the given kind that always succeeds.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            diagnostics: Vec::new(),
            fail: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Validate returns `diagnostic`.
    pub fn diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Every run fails with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail = Some(message.to_string());
        self
    }

    /// Instance ids this provisioner ran against.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Provisioner for MockProvisioner {
    fn validate(&self, _config: &ResolvedConfig) -> Vec<Diagnostic> {
        self.diagnostics.clone()
    }

    fn apply(
        &self,
        info: &InstanceInfo,
        _state: &InstanceState,
        _config: &ResolvedConfig,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(info.id.clone());
        match &self.fail {
            Some(message) => Err(Error::Provisioner {
                provisioner: self.kind.clone(),
                key: info.id.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Hook that records every event it observes.
#[derive(Default)]
pub struct RecordingHook {
    /// (state key, new instance id, whether an error was reported)
    pub post_applies: Mutex<Vec<(String, Option<String>, bool)>>,
    /// Number of state-update notifications
    pub state_updates: Mutex<usize>,
}

impl Hook for RecordingHook {
    fn post_apply(
        &self,
        info: &InstanceInfo,
        state: Option<&InstanceState>,
        error: Option<&Error>,
    ) -> Result<HookAction> {
        self.post_applies.lock().unwrap().push((
            info.id.clone(),
            state.map(|s| s.id.clone()),
            error.is_some(),
        ));
        Ok(HookAction::Continue)
    }

    fn post_state_update(&self, _state: &State) -> Result<HookAction> {
        *self.state_updates.lock().unwrap() += 1;
        Ok(HookAction::Continue)
    }
}

/// Minimal in-memory graph satisfying the transform contract.
#[derive(Default)]
pub struct TestGraph {
    /// Vertices in insertion order
    pub vertices: Vec<Arc<dyn Vertex>>,
    /// Edges as (from vertex name, to vertex name)
    pub edges: Vec<(String, String)>,
}

impl Graph for TestGraph {
    fn add(&mut self, vertex: Arc<dyn Vertex>) {
        self.vertices.push(vertex);
    }

    fn connect_dependent(&mut self, vertex: &dyn Vertex) {
        for dep in vertex.depends_on() {
            for other in &self.vertices {
                if other.name() != vertex.name() && other.dependable_names().contains(&dep) {
                    self.edges.push((other.name(), vertex.name()));
                }
            }
        }
    }
}
