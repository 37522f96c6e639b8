use std::collections::{HashMap, HashSet};

use super::model::Runbook;

/// Outcome of [`validate`]. Never an error: problems are reported as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a runbook before execution: unique non-empty ids, existing
/// dependencies, no self-dependency, no cycle, known steps in conditions and
/// `max_attempts >= 1`.
pub fn validate(runbook: &Runbook) -> ValidationReport {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for step in &runbook.steps {
        if step.id.trim().is_empty() {
            errors.push("Step with empty id".to_string());
            continue;
        }
        if !seen.insert(step.id.as_str()) {
            errors.push(format!("Duplicate step id: {}", step.id));
        }
    }

    for step in &runbook.steps {
        for dep in &step.depends_on {
            if dep == &step.id {
                errors.push(format!("Step '{}' depends on itself", step.id));
            } else if !seen.contains(dep.as_str()) {
                errors.push(format!(
                    "Dependency not found: step '{}' depends on '{}'",
                    step.id, dep
                ));
            }
        }

        if let Some(cond) = &step.condition {
            for referenced in cond.referenced_steps() {
                if !seen.contains(referenced) {
                    errors.push(format!(
                        "Condition of step '{}' references unknown step '{}'",
                        step.id, referenced
                    ));
                }
            }
        }

        if let Some(retry) = &step.retry {
            if retry.max_attempts == 0 {
                errors.push(format!(
                    "Step '{}' has max_attempts = 0 (must be at least 1)",
                    step.id
                ));
            }
        }
    }

    let graph = StepGraph::from_runbook(runbook);
    if let Some(cycle) = graph.detect_cycle() {
        errors.push(format!("Circular dependency detected: {cycle}"));
    } else if graph.topological_order().is_none() {
        errors.push("Unable to complete topological sort (cycle detected)".to_string());
    }

    ValidationReport { errors }
}

/// Dependency graph over step ids.
///
/// Edges that point at unknown steps are kept out of the graph; [`validate`]
/// reports them separately.
#[derive(Debug, Clone)]
pub struct StepGraph {
    /// step_id -> steps it depends on
    edges: HashMap<String, Vec<String>>,

    /// step_id -> steps that depend on it
    reverse_edges: HashMap<String, Vec<String>>,

    /// Original step order (for stable sorting)
    insertion_order: Vec<String>,
}

impl StepGraph {
    pub fn from_runbook(runbook: &Runbook) -> Self {
        let known: HashSet<&str> = runbook.steps.iter().map(|s| s.id.as_str()).collect();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::new();

        for step in &runbook.steps {
            if edges.contains_key(&step.id) {
                continue;
            }
            let deps: Vec<String> = step
                .depends_on
                .iter()
                .filter(|d| known.contains(d.as_str()))
                .cloned()
                .collect();

            for dep in &deps {
                reverse_edges
                    .entry(dep.clone())
                    .or_default()
                    .push(step.id.clone());
            }
            edges.insert(step.id.clone(), deps);
            insertion_order.push(step.id.clone());
        }

        Self {
            edges,
            reverse_edges,
            insertion_order,
        }
    }

    /// Kahn's algorithm; `None` when a cycle prevents consuming every node.
    ///
    /// Ties are broken by the runbook's own step order.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut order = Vec::with_capacity(self.insertion_order.len());
        let mut ready: Vec<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        while !ready.is_empty() {
            let mut next = Vec::new();
            for id in ready {
                order.push(id.to_string());
                for dependent in self.reverse_edges.get(id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }
            next.sort_by_key(|id| self.position(id));
            ready = next;
        }

        (order.len() == self.insertion_order.len()).then_some(order)
    }

    /// Detect a cycle with DFS and render it as `a -> b -> a`.
    pub fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for step_id in &self.insertion_order {
            if !visited.contains(step_id) && self.dfs_cycle(step_id, &mut visited, &mut stack) {
                return Some(stack.join(" -> "));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }

    fn position(&self, id: &str) -> usize {
        self.insertion_order
            .iter()
            .position(|k| k == id)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runbook::{RetryPolicy, RunbookStep, StepCondition};
    use pretty_assertions::assert_eq;

    fn rb(steps: Vec<RunbookStep>) -> Runbook {
        let mut r = Runbook::new("rb", "test");
        r.steps = steps;
        r
    }

    #[test]
    fn accepts_diamond() {
        let r = rb(vec![
            RunbookStep::new("a", "s"),
            RunbookStep::new("b", "s").depends_on(["a"]),
            RunbookStep::new("c", "s").depends_on(["a"]),
            RunbookStep::new("d", "s").depends_on(["b", "c"]),
        ]);
        let report = validate(&r);
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(
            StepGraph::from_runbook(&r).topological_order().unwrap(),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn topological_order_respects_dependencies_not_listing_order() {
        let r = rb(vec![
            RunbookStep::new("deploy", "s").depends_on(["build"]),
            RunbookStep::new("build", "s"),
        ]);
        assert_eq!(
            StepGraph::from_runbook(&r).topological_order().unwrap(),
            vec!["build", "deploy"]
        );
    }

    #[test]
    fn rejects_cycle_with_path() {
        let r = rb(vec![
            RunbookStep::new("a", "s").depends_on(["c"]),
            RunbookStep::new("b", "s").depends_on(["a"]),
            RunbookStep::new("c", "s").depends_on(["b"]),
        ]);
        let report = validate(&r);
        assert!(!report.is_valid());
        assert_eq!(
            report.errors,
            vec!["Circular dependency detected: a -> c -> b -> a".to_string()]
        );
        assert!(StepGraph::from_runbook(&r).topological_order().is_none());
    }

    #[test]
    fn rejects_self_and_dangling_dependencies() {
        let r = rb(vec![
            RunbookStep::new("a", "s").depends_on(["a"]),
            RunbookStep::new("b", "s").depends_on(["ghost"]),
        ]);
        let report = validate(&r);
        assert!(report
            .errors
            .contains(&"Step 'a' depends on itself".to_string()));
        assert!(report
            .errors
            .contains(&"Dependency not found: step 'b' depends on 'ghost'".to_string()));
    }

    #[test]
    fn rejects_duplicates_conditions_and_zero_attempts() {
        let r = rb(vec![
            RunbookStep::new("a", "s"),
            RunbookStep::new("a", "s"),
            RunbookStep::new("b", "s").with_condition(StepCondition::succeeded("nope")),
            RunbookStep::new("c", "s").with_retry(RetryPolicy::new(0, Default::default())),
        ]);
        let report = validate(&r);
        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
        assert!(report.errors[0].contains("Duplicate step id: a"));
    }

    #[test]
    fn empty_runbook_is_valid() {
        assert!(validate(&rb(vec![])).is_valid());
    }
}
