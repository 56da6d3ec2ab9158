//! Build step graph
//!
//! Steps are registered with the identifiers of steps they depend on. A
//! dependency must be registered before its dependents, so a graph built
//! only through [`StepGraph::register_step`] is acyclic. Edges added later
//! with [`StepGraph::add_dependency`] can close a cycle, which
//! [`StepGraph::compute_order`] reports.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use thiserror::Error;

use super::artifact::StepResult;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Build step '{step}' is already registered")]
    DuplicateStep { step: String },
    #[error("Build step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },
    #[error("Unknown build step or target '{name}'")]
    UnknownStep { name: String },
    #[error("Target name '{name}' is already used by a build step or target")]
    NameConflict { name: String },
    #[error("Cyclic dependency between build steps: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("No build steps were requested")]
    EmptyRequest,
}

/// Opaque reference to a registered step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepHandle(usize);

/// What a step action sees: the shared read-only context and the results of
/// the steps that ran before it in this build.
pub struct StepInput<'a, C> {
    pub context: &'a C,
    pub produced: &'a BTreeMap<String, StepResult>,
}

pub type StepAction<C> = Box<dyn Fn(&StepInput<'_, C>) -> anyhow::Result<StepResult>>;

struct StepNode<C> {
    id: String,
    dependencies: Vec<StepHandle>,
    action: StepAction<C>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

pub struct StepGraph<C> {
    steps: Vec<StepNode<C>>,
    by_id: HashMap<String, StepHandle>,
    targets: BTreeMap<String, Vec<StepHandle>>,
}

impl<C> Default for StepGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> StepGraph<C> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            by_id: HashMap::new(),
            targets: BTreeMap::new(),
        }
    }

    pub fn register_step<F>(
        &mut self,
        id: &str,
        dependencies: &[&str],
        action: F,
    ) -> Result<StepHandle, GraphError>
    where
        F: Fn(&StepInput<'_, C>) -> anyhow::Result<StepResult> + 'static,
    {
        let handles = dependencies
            .iter()
            .map(|dependency| {
                self.by_id
                    .get(*dependency)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownDependency {
                        step: id.to_string(),
                        dependency: dependency.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.register_step_with_handles(id, &handles, action)
    }

    pub fn register_step_with_handles<F>(
        &mut self,
        id: &str,
        dependencies: &[StepHandle],
        action: F,
    ) -> Result<StepHandle, GraphError>
    where
        F: Fn(&StepInput<'_, C>) -> anyhow::Result<StepResult> + 'static,
    {
        if self.by_id.contains_key(id) || self.targets.contains_key(id) {
            return Err(GraphError::DuplicateStep {
                step: id.to_string(),
            });
        }
        if let Some(StepHandle(index)) = dependencies.iter().find(|h| h.0 >= self.steps.len()) {
            return Err(GraphError::UnknownDependency {
                step: id.to_string(),
                dependency: format!("#{index}"),
            });
        }

        let mut deps = Vec::with_capacity(dependencies.len());
        for handle in dependencies {
            if !deps.contains(handle) {
                deps.push(*handle);
            }
        }

        let handle = StepHandle(self.steps.len());
        self.steps.push(StepNode {
            id: id.to_string(),
            dependencies: deps,
            action: Box::new(action),
        });
        self.by_id.insert(id.to_string(), handle);
        Ok(handle)
    }

    /// Name a group of steps. Requesting the target requests all of them.
    pub fn register_target(&mut self, name: &str, steps: &[&str]) -> Result<(), GraphError> {
        if self.by_id.contains_key(name) || self.targets.contains_key(name) {
            return Err(GraphError::NameConflict {
                name: name.to_string(),
            });
        }
        let members = steps
            .iter()
            .map(|step| self.handle(step))
            .collect::<Result<Vec<_>, _>>()?;
        self.targets.insert(name.to_string(), members);
        Ok(())
    }

    /// Add an edge `step -> dependency` between two registered steps.
    pub fn add_dependency(&mut self, step: &str, dependency: &str) -> Result<(), GraphError> {
        let dependency = self.handle(dependency)?;
        let StepHandle(index) = self.handle(step)?;
        let node = &mut self.steps[index];
        if !node.dependencies.contains(&dependency) {
            node.dependencies.push(dependency);
        }
        Ok(())
    }

    pub fn handle(&self, id: &str) -> Result<StepHandle, GraphError> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownStep {
                name: id.to_string(),
            })
    }

    pub fn id(&self, handle: StepHandle) -> &str {
        &self.steps[handle.0].id
    }

    /// Step identifiers in registration order.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.id.as_str())
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn dependencies(&self, id: &str) -> Result<Vec<&str>, GraphError> {
        let handle = self.handle(id)?;
        Ok(self.steps[handle.0]
            .dependencies
            .iter()
            .map(|dep| self.id(*dep))
            .collect())
    }

    pub(crate) fn run_step(
        &self,
        handle: StepHandle,
        input: &StepInput<'_, C>,
    ) -> anyhow::Result<StepResult> {
        (self.steps[handle.0].action)(input)
    }

    /// Execution order for the transitive closure of `requested`: every step
    /// comes after its dependencies and appears once. Independent steps keep
    /// their registration order.
    pub fn compute_order(&self, requested: &[&str]) -> Result<Vec<String>, GraphError> {
        Ok(self
            .order(requested, true)?
            .into_iter()
            .map(|handle| self.id(handle).to_string())
            .collect())
    }

    pub(crate) fn order(
        &self,
        requested: &[&str],
        with_dependencies: bool,
    ) -> Result<Vec<StepHandle>, GraphError> {
        let roots = self.resolve(requested)?;
        if !with_dependencies {
            let mut roots = roots;
            roots.sort();
            roots.dedup();
            return Ok(roots);
        }

        let mut marks = vec![Mark::Unvisited; self.steps.len()];
        let mut path = Vec::new();
        for root in &roots {
            self.visit(*root, &mut marks, &mut path)?;
        }

        // Kahn's algorithm over the closure, smallest registration index first.
        let in_closure = |h: &StepHandle| marks[h.0] == Mark::Done;
        let mut remaining: HashMap<StepHandle, usize> = HashMap::new();
        let mut dependents: HashMap<StepHandle, Vec<StepHandle>> = HashMap::new();
        for (index, node) in self.steps.iter().enumerate() {
            let handle = StepHandle(index);
            if !in_closure(&handle) {
                continue;
            }
            remaining.insert(handle, node.dependencies.len());
            for dep in &node.dependencies {
                dependents.entry(*dep).or_default().push(handle);
            }
        }

        let mut ready: BinaryHeap<Reverse<StepHandle>> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(handle, _)| Reverse(*handle))
            .collect();
        let mut order = Vec::with_capacity(remaining.len());
        while let Some(Reverse(handle)) = ready.pop() {
            order.push(handle);
            for dependent in dependents.get(&handle).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(*dependent));
                    }
                }
            }
        }
        Ok(order)
    }

    fn resolve(&self, requested: &[&str]) -> Result<Vec<StepHandle>, GraphError> {
        if requested.is_empty() {
            return Err(GraphError::EmptyRequest);
        }
        let mut handles = Vec::new();
        for name in requested {
            if let Some(handle) = self.by_id.get(*name) {
                handles.push(*handle);
            } else if let Some(members) = self.targets.get(*name) {
                handles.extend(members.iter().copied());
            } else {
                return Err(GraphError::UnknownStep {
                    name: name.to_string(),
                });
            }
        }
        if handles.is_empty() {
            return Err(GraphError::EmptyRequest);
        }
        Ok(handles)
    }

    fn visit(
        &self,
        handle: StepHandle,
        marks: &mut [Mark],
        path: &mut Vec<StepHandle>,
    ) -> Result<(), GraphError> {
        match marks[handle.0] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = path.iter().position(|h| *h == handle).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|h| self.id(*h).to_string())
                    .collect();
                cycle.push(self.id(handle).to_string());
                return Err(GraphError::CyclicDependency { cycle });
            }
            Mark::Unvisited => {}
        }

        marks[handle.0] = Mark::Visiting;
        path.push(handle);
        for dep in &self.steps[handle.0].dependencies {
            self.visit(*dep, marks, path)?;
        }
        path.pop();
        marks[handle.0] = Mark::Done;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn noop(_: &StepInput<'_, ()>) -> anyhow::Result<StepResult> {
        Ok(StepResult::empty())
    }

    fn chain() -> StepGraph<()> {
        let mut graph = StepGraph::new();
        graph.register_step("poms", &[], noop).unwrap();
        graph.register_step("jars", &["poms"], noop).unwrap();
        graph.register_step("strategoxt", &["poms", "jars"], noop).unwrap();
        graph
            .register_step("java", &["poms", "jars", "strategoxt"], noop)
            .unwrap();
        graph
            .register_step("languages", &["poms", "jars", "strategoxt", "java"], noop)
            .unwrap();
        graph
    }

    #[test]
    fn test_fresh_build_order_without_duplicates() {
        let graph = chain();
        assert_eq!(
            graph.compute_order(&["languages"]).unwrap(),
            vec!["poms", "jars", "strategoxt", "java", "languages"]
        );
    }

    #[test]
    fn test_shared_dependencies_are_deduplicated() {
        let graph = chain();
        assert_eq!(
            graph.compute_order(&["java", "jars", "languages"]).unwrap(),
            vec!["poms", "jars", "strategoxt", "java", "languages"]
        );
    }

    #[test]
    fn test_independent_steps_keep_registration_order() {
        let mut graph: StepGraph<()> = StepGraph::new();
        graph.register_step("base", &[], noop).unwrap();
        graph.register_step("spt", &["base"], noop).unwrap();
        graph.register_step("dynsem", &["base"], noop).unwrap();

        assert_eq!(
            graph.compute_order(&["dynsem", "spt"]).unwrap(),
            vec!["base", "spt", "dynsem"]
        );
    }

    #[test]
    fn test_duplicate_step_is_rejected() {
        let mut graph = chain();
        let err = graph.register_step("jars", &[], noop).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateStep {
                step: "jars".to_string()
            }
        );
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let mut graph: StepGraph<()> = StepGraph::new();
        let err = graph.register_step("java", &["poms"], noop).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                step: "java".to_string(),
                dependency: "poms".to_string()
            }
        );
    }

    #[test]
    fn test_targets_expand_to_members() {
        let mut graph = chain();
        graph.register_step("java-libs", &["java"], noop).unwrap();
        graph.register_target("all", &["poms", "jars", "languages"]).unwrap();

        let order = graph.compute_order(&["all"]).unwrap();
        assert_eq!(order, vec!["poms", "jars", "strategoxt", "java", "languages"]);
        assert!(matches!(
            graph.register_target("java", &["poms"]),
            Err(GraphError::NameConflict { .. })
        ));
    }

    #[test]
    fn test_unknown_and_empty_requests() {
        let graph = chain();
        assert!(matches!(
            graph.compute_order(&["nope"]),
            Err(GraphError::UnknownStep { .. })
        ));
        assert_eq!(graph.compute_order(&[]), Err(GraphError::EmptyRequest));
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut graph: StepGraph<()> = StepGraph::new();
        graph.register_step("a", &[], noop).unwrap();
        graph.register_step("b", &["a"], noop).unwrap();
        graph.register_step("c", &["b"], noop).unwrap();
        graph.add_dependency("a", "c").unwrap();

        for requested in ["a", "b", "c"] {
            let err = graph.compute_order(&[requested]).unwrap_err();
            assert!(matches!(err, GraphError::CyclicDependency { .. }), "{requested}");
        }
    }

    #[test]
    fn test_cycle_outside_request_is_not_reported() {
        let mut graph: StepGraph<()> = StepGraph::new();
        graph.register_step("standalone", &[], noop).unwrap();
        graph.register_step("a", &[], noop).unwrap();
        graph.register_step("b", &["a"], noop).unwrap();
        graph.add_dependency("a", "b").unwrap();

        assert_eq!(graph.compute_order(&["standalone"]).unwrap(), vec!["standalone"]);
    }

    #[test]
    fn test_without_dependencies_only_requested_steps_run() {
        let graph = chain();
        let order: Vec<_> = graph
            .order(&["languages", "jars", "languages"], false)
            .unwrap()
            .into_iter()
            .map(|h| graph.id(h).to_string())
            .collect();
        assert_eq!(order, vec!["jars", "languages"]);
    }

    /// Random DAG: step `i` may only depend on steps registered before it.
    fn arb_graph() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
        (1usize..16).prop_flat_map(|n| {
            let deps = (0..n)
                .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(4)))
                .collect::<Vec<_>>();
            let requested = proptest::collection::vec(0..n, 1..=n.min(5));
            (deps, requested)
        })
    }

    fn build_graph(deps: &[Vec<usize>]) -> StepGraph<()> {
        let mut graph = StepGraph::new();
        for (i, step_deps) in deps.iter().enumerate() {
            let names: Vec<String> = if i == 0 {
                Vec::new()
            } else {
                step_deps.iter().map(|d| format!("s{d}")).collect()
            };
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            graph.register_step(&format!("s{i}"), &refs, noop).unwrap();
        }
        graph
    }

    proptest! {
        #[test]
        fn prop_order_respects_dependencies((deps, requested) in arb_graph()) {
            let graph = build_graph(&deps);
            let names: Vec<String> = requested.iter().map(|r| format!("s{r}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();

            let order = graph.compute_order(&refs).unwrap();
            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

            prop_assert_eq!(position.len(), order.len());
            for name in &names {
                prop_assert!(position.contains_key(name.as_str()));
            }
            for id in &order {
                for dep in graph.dependencies(id).unwrap() {
                    prop_assert!(position.contains_key(dep));
                    prop_assert!(position[dep] < position[id.as_str()]);
                }
            }
        }

        #[test]
        fn prop_order_is_deterministic((deps, requested) in arb_graph()) {
            let graph = build_graph(&deps);
            let names: Vec<String> = requested.iter().map(|r| format!("s{r}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();

            prop_assert_eq!(graph.compute_order(&refs).unwrap(), graph.compute_order(&refs).unwrap());
            prop_assert_eq!(
                graph.compute_order(&refs).unwrap(),
                build_graph(&deps).compute_order(&refs).unwrap()
            );
        }
    }
}
