//! Named steps and the prerequisite graph over them.
//!
//! A [`StepGraph`] is validated once at construction: names are
//! unique, every prerequisite exists, and the prerequisite
//! relation is acyclic. Scheduling is then a pure function of the
//! declaration.

use std::collections::BTreeSet;
use std::time::Duration;

use indexmap::IndexMap;

use crate::error::{DeployError, DeployResult};

/// A named unit of remote work.
///
/// # Example
///
/// ```
/// use trebuchet::graph::Step;
///
/// let step = Step::new("BackendBuild", "cd /srv/app && npm run build")
///     .requires("EnvUpload")
///     .continue_on_failure();
///
/// assert_eq!(step.requires, vec!["EnvUpload"]);
/// assert!(step.continue_on_failure);
/// assert!(!step.delete_before_replace);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    /// Rendered script, opaque to the scheduler.
    pub command: String,
    pub requires: Vec<String>,
    /// Whether re-running must tear down before redoing. Carried for
    /// callers, never interpreted here.
    pub delete_before_replace: bool,
    /// Record a failure of this step but keep the run going.
    pub continue_on_failure: bool,
    /// Overrides the orchestrator's default step timeout.
    pub timeout: Option<Duration>,
}

impl Step {
    #[must_use]
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            requires: Vec::new(),
            delete_before_replace: false,
            continue_on_failure: false,
            timeout: None,
        }
    }

    #[must_use]
    pub fn requires(mut self, name: &str) -> Self {
        if !self.requires.iter().any(|r| r == name) {
            self.requires.push(name.to_string());
        }
        self
    }

    #[must_use]
    pub const fn delete_before_replace(mut self, enabled: bool) -> Self {
        self.delete_before_replace = enabled;
        self
    }

    #[must_use]
    pub const fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Validated set of steps plus their prerequisite edges, indexed by
/// declaration order.
#[derive(Debug, Clone)]
pub struct StepGraph {
    steps: IndexMap<String, Step>,
    /// `prereqs[i]` holds the declaration indices step `i` waits on.
    prereqs: Vec<Vec<usize>>,
}

impl StepGraph {
    /// Build a graph, rejecting duplicate names, unknown or
    /// self-referencing prerequisites, and cycles.
    pub fn new(steps: Vec<Step>) -> DeployResult<Self> {
        let mut by_name = IndexMap::with_capacity(steps.len());
        for step in steps {
            if by_name.contains_key(&step.name) {
                return Err(DeployError::GraphInvalid(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            by_name.insert(step.name.clone(), step);
        }

        let mut prereqs = Vec::with_capacity(by_name.len());
        for step in by_name.values() {
            let mut deps = Vec::with_capacity(step.requires.len());
            for dep in &step.requires {
                if dep == &step.name {
                    return Err(DeployError::GraphInvalid(format!(
                        "step '{dep}' requires itself"
                    )));
                }
                let idx = by_name.get_index_of(dep).ok_or_else(|| {
                    DeployError::GraphInvalid(format!(
                        "step '{}' requires unknown step '{dep}'",
                        step.name
                    ))
                })?;
                deps.push(idx);
            }
            prereqs.push(deps);
        }

        let graph = Self {
            steps: by_name,
            prereqs,
        };
        graph.schedule()?;
        Ok(graph)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// Declaration index of `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.steps.get_index_of(name)
    }

    /// Declaration indices `idx` waits on, `None` past the last step.
    #[must_use]
    pub fn prerequisites(&self, idx: usize) -> Option<&[usize]> {
        self.prereqs.get(idx).map(Vec::as_slice)
    }

    /// Execution order: repeatedly take the lowest-index step whose
    /// prerequisites are all scheduled. Unrelated steps therefore
    /// keep their declaration order.
    pub fn schedule(&self) -> DeployResult<Vec<&Step>> {
        let n = self.steps.len();
        let mut remaining: Vec<usize> = self.prereqs.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, deps) in self.prereqs.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(idx);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &next in &dependents[idx] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| remaining[i] > 0)
                .map(|i| self.steps[i].name.as_str())
                .collect();
            return Err(DeployError::GraphInvalid(format!(
                "cycle detected among steps: {}",
                stuck.join(", ")
            )));
        }

        Ok(order.into_iter().map(|i| &self.steps[i]).collect())
    }
}
