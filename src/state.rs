//! Shared state tracking every managed resource instance.
//!
//! The state is a map of module path to resource name to [`ResourceState`],
//! shared across concurrent graph walks behind a reader/writer lock. Steps
//! acquire the lock only for the narrow window of a single read or write and
//! never hold it across a provider call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Handle to the state shared by every concurrent graph walk.
pub type SharedState = Arc<RwLock<State>>;

/// Path of the root module.
pub fn root_module_path() -> Vec<String> {
    vec!["root".to_string()]
}

/// Top-level state container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-module state, keyed by module path
    #[serde(default)]
    pub modules: Vec<ModuleState>,
}

impl State {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this state for sharing across walks.
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Look up the module at `path`.
    pub fn module(&self, path: &[String]) -> Option<&ModuleState> {
        self.modules.iter().find(|m| m.path == path)
    }

    /// Look up the module at `path` mutably.
    pub fn module_mut(&mut self, path: &[String]) -> Option<&mut ModuleState> {
        self.modules.iter_mut().find(|m| m.path == path)
    }

    /// The module at `path`, created if absent.
    pub fn add_module(&mut self, path: &[String]) -> &mut ModuleState {
        if let Some(idx) = self.modules.iter().position(|m| m.path == path) {
            return &mut self.modules[idx];
        }
        log::debug!("state: adding module {}", path.join("."));
        let idx = self.modules.len();
        self.modules.push(ModuleState {
            path: path.to_vec(),
            resources: HashMap::new(),
        });
        &mut self.modules[idx]
    }

    /// Drop resource rows that no longer track any instance.
    pub fn prune(&mut self) {
        for module in &mut self.modules {
            module.resources.retain(|_, rs| !rs.is_empty());
        }
    }
}

/// State of a single module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Module path, `["root"]` for the top level
    pub path: Vec<String>,
    /// Resource state keyed by state key (`type.name` or `type.name.index`)
    #[serde(default)]
    pub resources: HashMap<String, ResourceState>,
}

/// State of one expanded resource instance slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type, overwritten on every write
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Last-known inbound dependency labels
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// The current live instance
    pub primary: Option<InstanceState>,
    /// Instances awaiting destruction after a failed create or provision
    #[serde(default)]
    pub tainted: Vec<InstanceState>,
    /// Instance set aside by create-before-destroy, destroyed once the
    /// replacement succeeds
    pub deposed: Option<InstanceState>,
}

impl ResourceState {
    /// Whether this row tracks no instance at all and may be pruned.
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.tainted.is_empty() && self.deposed.is_none()
    }

    /// Move the primary aside ahead of a create-before-destroy replacement.
    ///
    /// No-op when there is no primary.
    pub fn depose(&mut self) {
        if let Some(primary) = self.primary.take() {
            self.deposed = Some(primary);
        }
    }

    /// Restore the deposed instance as primary, abandoning whatever the
    /// failed replacement left there.
    ///
    /// No-op when nothing is deposed.
    pub fn undepose(&mut self) {
        if let Some(deposed) = self.deposed.take() {
            self.primary = Some(deposed);
        }
    }

    /// Queue the deposed instance for destruction on the tainted list.
    ///
    /// Runs after a create-before-destroy replacement succeeds; the
    /// destroy-variant node then consumes the most recent tainted entry.
    pub fn taint_deposed(&mut self) {
        if let Some(deposed) = self.deposed.take() {
            self.tainted.push(deposed);
        }
    }

    /// The most recent tainted instance.
    pub fn last_tainted(&self) -> Option<&InstanceState> {
        self.tainted.last()
    }
}

/// State of a single instance in the real infrastructure.
///
/// Opaque to the engine except for the id; an empty id means no instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Provider-assigned identifier; empty means the instance does not exist
    #[serde(default)]
    pub id: String,
    /// Flat attribute map
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl InstanceState {
    /// An instance with the given id and no attributes.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            attributes: HashMap::new(),
        }
    }

    /// Whether this value stands for "no instance".
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}
