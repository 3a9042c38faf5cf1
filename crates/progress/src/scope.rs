//! Weighted, hierarchical progress scopes.
//!
//! A [`ProgressScope`] owns a budget of integer units. Sub-scopes are carved
//! out of the parent's remaining budget with [`ProgressScope::child`]; a
//! child's completion fraction is scaled onto the units it was allocated, so
//! the root always reports a single coherent figure.
//!
//! Every scope completes exactly once: explicitly through
//! [`ProgressScope::done`], or implicitly when it is dropped.

use crate::observer::{ProgressEvent, ProgressObserver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Requested more units than a scope has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("requested {requested} progress units but only {remaining} remain")]
pub struct OverBudgetError {
    /// Units asked for
    pub requested: u32,
    /// Units still unallocated in the parent
    pub remaining: u32,
}

struct ParentLink {
    node: Arc<Node>,
    units: u32,
}

#[derive(Default)]
struct NodeState {
    name: String,
    total: Option<u32>,
    indeterminate: bool,
    // Units consumed, including the scaled contribution of children.
    worked: f64,
    // Units handed out to children or consumed directly.
    allocated: u32,
    // Units already pushed to the parent.
    reported: f64,
    done: bool,
    // Root only: latest detail line from anywhere in the tree.
    detail: Option<String>,
}

impl NodeState {
    fn fraction(&self) -> f64 {
        if self.done {
            return 1.0;
        }
        match self.total {
            Some(total) if total > 0 && !self.indeterminate => {
                (self.worked / total as f64).min(1.0)
            }
            _ => 0.0,
        }
    }

    fn remaining(&self) -> u32 {
        if self.done || self.indeterminate {
            return 0;
        }
        self.total.unwrap_or(0).saturating_sub(self.allocated)
    }
}

struct Node {
    state: Mutex<NodeState>,
    parent: Option<ParentLink>,
    observers: Arc<Vec<Arc<dyn ProgressObserver>>>,
}

impl Node {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn root(self: &Arc<Self>) -> Arc<Node> {
        let mut node = Arc::clone(self);
        while let Some(link) = &node.parent {
            let parent = Arc::clone(&link.node);
            node = parent;
        }
        node
    }

    /// Push this node's current fraction up the chain.
    fn propagate(self: &Arc<Self>) {
        let Some(link) = &self.parent else {
            self.notify(false);
            return;
        };

        let delta = {
            let mut state = self.lock();
            let target = link.units as f64 * state.fraction();
            let delta = (target - state.reported).max(0.0);
            state.reported += delta;
            delta
        };

        if delta > 0.0 {
            link.node.add_worked(delta);
            link.node.propagate();
        }
    }

    fn add_worked(&self, delta: f64) {
        let mut state = self.lock();
        let cap = state.total.unwrap_or(0) as f64;
        state.worked = (state.worked + delta).min(cap);
    }

    fn set_detail(self: &Arc<Self>, detail: &str) {
        let root = self.root();
        root.lock().detail = Some(detail.to_string());
        root.notify(false);
    }

    fn notify(&self, done: bool) {
        if self.observers.is_empty() {
            return;
        }
        let event = {
            let state = self.lock();
            ProgressEvent {
                task: state.name.clone(),
                detail: state.detail.clone(),
                completed: state.worked,
                total: state.total.unwrap_or(0),
                done,
            }
        };
        for observer in self.observers.iter() {
            observer.on_progress(&event);
        }
    }
}

/// A node in the progress tree.
pub struct ProgressScope {
    node: Arc<Node>,
}

impl ProgressScope {
    /// Create an unstarted root scope reporting to the given observers.
    pub fn root(observers: Vec<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            node: Arc::new(Node {
                state: Mutex::new(NodeState::default()),
                parent: None,
                observers: Arc::new(observers),
            }),
        }
    }

    /// A root scope nobody observes.
    pub fn detached() -> Self {
        Self::root(Vec::new())
    }

    /// Start the scope with a name and a unit budget.
    ///
    /// Only the first call has an effect.
    pub fn begin(&self, name: impl Into<String>, total_units: u32) {
        let name = name.into();
        {
            let mut state = self.node.lock();
            if state.done || state.total.is_some() || state.indeterminate {
                return;
            }
            state.name = name.clone();
            state.total = Some(total_units);
        }
        self.announce(&name);
    }

    /// Start the scope as a span of unknown duration.
    ///
    /// Intermediate work is not reflected in the reported completion; the
    /// scope jumps to complete on [`done`](Self::done).
    pub fn report_indeterminate(&self, name: impl Into<String>) {
        let name = name.into();
        {
            let mut state = self.node.lock();
            if state.done || state.total.is_some() || state.indeterminate {
                return;
            }
            state.name = name.clone();
            state.indeterminate = true;
        }
        self.announce(&name);
    }

    fn announce(&self, name: &str) {
        if self.node.parent.is_some() {
            if !name.is_empty() {
                self.node.set_detail(name);
            }
        } else {
            self.node.notify(false);
        }
    }

    /// Allocate a sub-scope consuming `units` of this scope's budget.
    pub fn child(&self, units: u32) -> Result<ProgressScope, OverBudgetError> {
        {
            let mut state = self.node.lock();
            let remaining = state.remaining();
            if units > remaining {
                return Err(OverBudgetError {
                    requested: units,
                    remaining,
                });
            }
            state.allocated += units;
        }

        Ok(Self {
            node: Arc::new(Node {
                state: Mutex::new(NodeState::default()),
                parent: Some(ParentLink {
                    node: Arc::clone(&self.node),
                    units,
                }),
                observers: Arc::clone(&self.node.observers),
            }),
        })
    }

    /// Consume `units` directly, clamped to what is left.
    pub fn worked(&self, units: u32) {
        {
            let mut state = self.node.lock();
            let units = units.min(state.remaining());
            if units == 0 {
                return;
            }
            state.allocated += units;
            state.worked += units as f64;
        }
        self.node.propagate();
    }

    /// Update the detail line shown under the root task.
    pub fn sub_task(&self, detail: &str) {
        if self.is_done() {
            return;
        }
        self.node.set_detail(detail);
    }

    /// Complete the scope. Idempotent.
    pub fn done(&self) {
        {
            let mut state = self.node.lock();
            if state.done {
                return;
            }
            state.done = true;
            if let Some(total) = state.total {
                state.worked = total as f64;
                state.allocated = total;
            }
        }

        if self.node.parent.is_some() {
            self.node.propagate();
        } else {
            self.node.notify(true);
        }
    }

    /// A cheap handle for updating the detail line from callbacks.
    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle {
            node: Arc::clone(&self.node),
        }
    }

    /// Whether the scope has completed.
    pub fn is_done(&self) -> bool {
        self.node.lock().done
    }

    /// Budget given to [`begin`](Self::begin), if started with one.
    pub fn total(&self) -> Option<u32> {
        self.node.lock().total
    }

    /// Units allocated to children or consumed directly.
    pub fn allocated(&self) -> u32 {
        self.node.lock().allocated
    }

    /// Units completed so far, including children's scaled progress.
    pub fn completed(&self) -> f64 {
        self.node.lock().worked
    }

    /// Scope name.
    pub fn name(&self) -> String {
        self.node.lock().name.clone()
    }
}

impl Drop for ProgressScope {
    fn drop(&mut self) {
        self.done();
    }
}

impl std::fmt::Debug for ProgressScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.node.lock();
        f.debug_struct("ProgressScope")
            .field("name", &state.name)
            .field("total", &state.total)
            .field("worked", &state.worked)
            .field("done", &state.done)
            .finish()
    }
}

/// Detail-line access to a scope, usable from `'static` callbacks.
#[derive(Clone)]
pub struct ProgressHandle {
    node: Arc<Node>,
}

impl ProgressHandle {
    /// Update the detail line unless the scope already completed.
    pub fn sub_task(&self, detail: &str) {
        if self.node.lock().done {
            return;
        }
        self.node.set_detail(detail);
    }
}
