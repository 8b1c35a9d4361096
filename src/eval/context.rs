//! Ambient services and per-tree registers for evaluation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::diff::{DiffStore, InstanceDiff, SharedDiff};
use crate::error::{Error, Result};
use crate::hook::{Hook, HookAction};
use crate::interpolate::{InstanceRef, Interpolate, LiteralInterpolator, RawConfig, ResolvedConfig};
use crate::provider::{Diagnostic, Provider, Provisioner};
use crate::state::{root_module_path, InstanceState, SharedState, State};
use crate::walk::WalkPhase;

/// Ambient services handed to every evaluation step.
///
/// One context serves a whole walk; independent vertices may evaluate their
/// trees against it from parallel threads. All shared data sits behind
/// locks, acquired per step for the narrow window of a read or a write.
pub struct EvalContext {
    state: SharedState,
    diffs: SharedDiff,
    path: Vec<String>,
    phase: WalkPhase,
    providers: HashMap<String, Arc<dyn Provider>>,
    provisioners: HashMap<String, Arc<dyn Provisioner>>,
    interpolator: Arc<dyn Interpolate>,
    hooks: Vec<Arc<dyn Hook>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl EvalContext {
    /// Start building a context for a walk under `phase`.
    pub fn builder(phase: WalkPhase) -> EvalContextBuilder {
        EvalContextBuilder::new(phase)
    }

    /// The phase the current walk runs under.
    pub fn phase(&self) -> WalkPhase {
        self.phase
    }

    /// Module path this context evaluates within.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Run `f` with the state locked for reading.
    pub fn with_state_read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Run `f` with the state locked for writing.
    pub fn with_state_write<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.write().unwrap();
        f(&mut state)
    }

    /// Run `f` with the diff store locked for reading.
    pub fn with_diffs_read<T>(&self, f: impl FnOnce(&DiffStore) -> T) -> T {
        let diffs = self.diffs.read().unwrap();
        f(&diffs)
    }

    /// Run `f` with the diff store locked for writing.
    pub fn with_diffs_write<T>(&self, f: impl FnOnce(&mut DiffStore) -> T) -> T {
        let mut diffs = self.diffs.write().unwrap();
        f(&mut diffs)
    }

    /// Look up a registered provider.
    pub fn provider(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))
    }

    /// Look up a registered provisioner.
    pub fn provisioner(&self, kind: &str) -> Result<Arc<dyn Provisioner>> {
        self.provisioners
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownProvisioner(kind.to_string()))
    }

    /// Resolve a raw configuration for `resource`.
    pub fn interpolate(&self, raw: &RawConfig, resource: &InstanceRef) -> Result<ResolvedConfig> {
        self.interpolator.interpolate(raw, resource)
    }

    /// Dispatch an event to every hook, stopping early if one halts.
    pub fn hook(&self, f: impl Fn(&dyn Hook) -> Result<HookAction>) -> Result<()> {
        for hook in &self.hooks {
            match f(hook.as_ref())? {
                HookAction::Continue => {}
                HookAction::Halt => break,
            }
        }
        Ok(())
    }

    /// Record validation diagnostics.
    pub fn push_diagnostics(&self, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.diagnostics.lock().unwrap().extend(diagnostics);
    }

    /// Drain the diagnostics collected so far, typically after a validate
    /// walk completes.
    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = self.diagnostics.lock().unwrap();
        std::mem::take(&mut *diagnostics)
    }
}

/// Builder for [`EvalContext`].
pub struct EvalContextBuilder {
    state: Option<SharedState>,
    diffs: Option<SharedDiff>,
    path: Vec<String>,
    phase: WalkPhase,
    providers: HashMap<String, Arc<dyn Provider>>,
    provisioners: HashMap<String, Arc<dyn Provisioner>>,
    interpolator: Option<Arc<dyn Interpolate>>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl EvalContextBuilder {
    /// A builder for a walk under `phase`, rooted at the root module.
    pub fn new(phase: WalkPhase) -> Self {
        Self {
            state: None,
            diffs: None,
            path: root_module_path(),
            phase,
            providers: HashMap::new(),
            provisioners: HashMap::new(),
            interpolator: None,
            hooks: Vec::new(),
        }
    }

    /// Use an existing shared state.
    pub fn state(mut self, state: SharedState) -> Self {
        self.state = Some(state);
        self
    }

    /// Use an existing shared diff store.
    pub fn diffs(mut self, diffs: SharedDiff) -> Self {
        self.diffs = Some(diffs);
        self
    }

    /// Evaluate within the module at `path`.
    pub fn path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    /// Register a provider under `name`.
    pub fn provider(mut self, name: &str, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    /// Register a provisioner under `kind`.
    pub fn provisioner(mut self, kind: &str, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioners.insert(kind.to_string(), provisioner);
        self
    }

    /// Use a specific interpolator instead of the literal pass-through.
    pub fn interpolator(mut self, interpolator: Arc<dyn Interpolate>) -> Self {
        self.interpolator = Some(interpolator);
        self
    }

    /// Attach an observer hook.
    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Finish the context.
    pub fn build(self) -> EvalContext {
        EvalContext {
            state: self.state.unwrap_or_else(|| State::new().shared()),
            diffs: self.diffs.unwrap_or_else(|| DiffStore::new().shared()),
            path: self.path,
            phase: self.phase,
            providers: self.providers,
            provisioners: self.provisioners,
            interpolator: self
                .interpolator
                .unwrap_or_else(|| Arc::new(LiteralInterpolator)),
            hooks: self.hooks,
            diagnostics: Mutex::new(Vec::new()),
        }
    }
}

/// Registers shared by the steps of one tree evaluation.
///
/// Each register stands in for a variable the evaluation tree threads
/// between its steps; a fresh scope is created per vertex per walk.
#[derive(Default)]
pub struct EvalScope {
    /// Provider resolved by the most recent get-provider step
    pub provider: Option<Arc<dyn Provider>>,
    /// Provisioner resolved by the most recent get-provisioner step
    pub provisioner: Option<Arc<dyn Provisioner>>,
    /// Configuration resolved by the most recent interpolate step
    pub config: Option<ResolvedConfig>,
    /// Instance state register
    pub state: Option<InstanceState>,
    /// The diff as planned (read back from the store during apply)
    pub diff_saved: Option<InstanceDiff>,
    /// The working diff an apply executes
    pub diff_apply: Option<InstanceDiff>,
    /// Error recorded by apply or a provisioner, surfaced by the post hook
    pub error: Option<Error>,
    /// The apply created a new instance rather than updating in place
    pub create_new: bool,
    /// The instance must be queued for destruction
    pub tainted: bool,
    /// This apply replaces the instance under create-before-destroy
    pub create_before_destroy: bool,
}

impl EvalScope {
    /// A fresh scope with every register empty.
    pub fn new() -> Self {
        Self::default()
    }
}
