//! Instance diffs and the shared diff store.
//!
//! A diff is a provider-produced description of the changes needed to
//! reconcile state with configuration. Plan walks save diffs under the
//! instance's state key; apply walks read them back and refuse to execute a
//! diff that no longer matches what the provider would do now.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Handle to the diff store shared by every concurrent graph walk.
pub type SharedDiff = Arc<RwLock<DiffStore>>;

/// A single attribute change within an instance diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDiff {
    /// Value before the change
    #[serde(default)]
    pub old: String,
    /// Value after the change
    #[serde(default)]
    pub new: String,
    /// Changing this attribute forces a replacement
    #[serde(default)]
    pub requires_new: bool,
    /// The new value is unknown until apply
    #[serde(default)]
    pub new_computed: bool,
}

impl AttributeDiff {
    /// An in-place update from `old` to `new`.
    pub fn update(old: &str, new: &str) -> Self {
        Self {
            old: old.to_string(),
            new: new.to_string(),
            requires_new: false,
            new_computed: false,
        }
    }

    /// A change that forces replacement of the instance.
    pub fn forces_new(old: &str, new: &str) -> Self {
        Self {
            requires_new: true,
            ..Self::update(old, new)
        }
    }
}

/// The changes required to reconcile one instance with its configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceDiff {
    /// Destroy the instance
    #[serde(default)]
    pub destroy: bool,
    /// Per-attribute changes
    #[serde(default)]
    pub attributes: HashMap<String, AttributeDiff>,
}

impl InstanceDiff {
    /// The "pure destroy" shape: tear down, change nothing else.
    pub fn for_destroy() -> Self {
        Self {
            destroy: true,
            attributes: HashMap::new(),
        }
    }

    /// Whether any attribute change forces a replacement.
    pub fn requires_new(&self) -> bool {
        self.attributes.values().any(|a| a.requires_new)
    }

    /// Whether this is a pure destroy.
    pub fn is_destroy(&self) -> bool {
        self.destroy && self.attributes.is_empty()
    }

    /// Whether this diff changes nothing at all.
    pub fn is_empty(&self) -> bool {
        !self.destroy && self.attributes.is_empty()
    }

    /// Reduce to the destroy-only shape, dropping all attribute changes.
    pub fn to_destroy(&self) -> InstanceDiff {
        InstanceDiff {
            destroy: self.destroy,
            attributes: HashMap::new(),
        }
    }

    /// Check that `other` describes the same change as this diff.
    ///
    /// Used to compare the plan-time diff against the one recomputed at
    /// apply time. The destroy flag is not compared: apply forces it off on
    /// its working copy before the comparison. Computed attributes resolve
    /// at apply, so their values are exempt as well.
    pub fn same(&self, other: &InstanceDiff) -> std::result::Result<(), String> {
        if self.requires_new() != other.requires_new() {
            return Err(format!(
                "replacement disagreement: {} vs {}",
                self.requires_new(),
                other.requires_new()
            ));
        }

        for (key, attr) in &self.attributes {
            match other.attributes.get(key) {
                None => return Err(format!("attribute missing: {}", key)),
                Some(o) => {
                    if attr.new_computed || o.new_computed {
                        continue;
                    }
                    if attr.new != o.new {
                        return Err(format!(
                            "value mismatch for {}: {:?} vs {:?}",
                            key, attr.new, o.new
                        ));
                    }
                }
            }
        }
        for key in other.attributes.keys() {
            if !self.attributes.contains_key(key) {
                return Err(format!("unexpected attribute: {}", key));
            }
        }

        Ok(())
    }
}

/// Saved diffs for every module, keyed like the state store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffStore {
    /// Per-module diffs
    #[serde(default)]
    pub modules: Vec<ModuleDiff>,
}

impl DiffStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this store for sharing across walks.
    pub fn shared(self) -> SharedDiff {
        Arc::new(RwLock::new(self))
    }

    /// Look up the module at `path`.
    pub fn module(&self, path: &[String]) -> Option<&ModuleDiff> {
        self.modules.iter().find(|m| m.path == path)
    }

    /// The module at `path`, created if absent.
    pub fn add_module(&mut self, path: &[String]) -> &mut ModuleDiff {
        if let Some(idx) = self.modules.iter().position(|m| m.path == path) {
            return &mut self.modules[idx];
        }
        let idx = self.modules.len();
        self.modules.push(ModuleDiff {
            path: path.to_vec(),
            diffs: HashMap::new(),
        });
        &mut self.modules[idx]
    }
}

/// Saved diffs for a single module, keyed by state key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDiff {
    /// Module path
    pub path: Vec<String>,
    /// Saved diffs by state key
    #[serde(default)]
    pub diffs: HashMap<String, InstanceDiff>,
}
