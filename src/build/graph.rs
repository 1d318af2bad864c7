//! Module dependency graph.
//!
//! Nodes are scanned units, edges point from an importer to the unit that
//! exports the imported module. The graph is validated (unique exports, no
//! cycles) once at construction and never mutated afterwards.

use super::unit::{Unit, UnitId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("module `{module}` is exported by both {} and {}", .first.display(), .second.display())]
    DuplicateModuleExport {
        module: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{} imports module `{module}`, which no project source exports", .importer.display())]
    UnresolvedImport { module: String, importer: PathBuf },

    #[error("module dependency cycle: {}", render_cycle(.cycle))]
    DependencyCycle { cycle: Vec<String> },
}

fn render_cycle(cycle: &[String]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        names.push(first);
    }
    names.join(" -> ")
}

#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Fail on imports that no project unit exports.
    pub strict: bool,
    /// Imports that are always satisfied from outside the project.
    pub external_modules: Vec<String>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            strict: false,
            external_modules: vec!["std".to_string(), "std.compat".to_string()],
        }
    }
}

impl GraphOptions {
    fn is_external(&self, module: &str) -> bool {
        self.external_modules.iter().any(|m| m == module)
    }
}

#[derive(Debug)]
pub struct Graph {
    units: Vec<Unit>,
    dependencies: Vec<Vec<UnitId>>,
    dependents: Vec<Vec<UnitId>>,
    exporters: HashMap<String, UnitId>,
    by_path: HashMap<PathBuf, UnitId>,
    order: Vec<UnitId>,
}

impl Graph {
    pub fn build(units: Vec<Unit>, options: &GraphOptions) -> Result<Graph, GraphError> {
        let mut exporters: HashMap<String, UnitId> = HashMap::new();
        for (id, unit) in units.iter().enumerate() {
            let Some(name) = &unit.exports else { continue };
            if let Some(&first) = exporters.get(name) {
                return Err(GraphError::DuplicateModuleExport {
                    module: name.clone(),
                    first: units[first].path.clone(),
                    second: unit.path.clone(),
                });
            }
            exporters.insert(name.clone(), id);
        }

        let mut dependencies = vec![Vec::new(); units.len()];
        let mut dependents = vec![Vec::new(); units.len()];
        for (id, unit) in units.iter().enumerate() {
            for module in &unit.imports {
                match exporters.get(module) {
                    Some(&exporter) => {
                        if !dependencies[id].contains(&exporter) {
                            dependencies[id].push(exporter);
                            dependents[exporter].push(id);
                        }
                    }
                    None if options.strict && !options.is_external(module) => {
                        return Err(GraphError::UnresolvedImport {
                            module: module.clone(),
                            importer: unit.path.clone(),
                        });
                    }
                    None => {}
                }
            }
        }

        let order = match topological_order(&dependencies, &dependents) {
            Some(order) => order,
            None => {
                let cycle = find_cycle(&dependencies)
                    .into_iter()
                    .map(|id| units[id].display_name())
                    .collect();
                return Err(GraphError::DependencyCycle { cycle });
            }
        };

        let by_path = units
            .iter()
            .enumerate()
            .map(|(id, unit)| (unit.path.clone(), id))
            .collect();

        Ok(Graph {
            units,
            dependencies,
            dependents,
            exporters,
            by_path,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id]
    }

    /// Units `id` imports from, in first-import order.
    pub fn dependencies(&self, id: UnitId) -> &[UnitId] {
        &self.dependencies[id]
    }

    /// Units importing `id`, in source-list order.
    pub fn dependents(&self, id: UnitId) -> &[UnitId] {
        &self.dependents[id]
    }

    pub fn exporter(&self, module: &str) -> Option<UnitId> {
        self.exporters.get(module).copied()
    }

    pub fn unit_by_path(&self, path: &Path) -> Option<UnitId> {
        self.by_path.get(path).copied()
    }

    /// Dependencies before dependents; ties resolved by source-list order.
    pub fn topological_order(&self) -> &[UnitId] {
        &self.order
    }

    /// Every unit reachable through dependent edges, sorted by id.
    pub fn transitive_dependents(&self, id: UnitId) -> Vec<UnitId> {
        let mut seen = vec![false; self.units.len()];
        let mut queue: VecDeque<UnitId> = self.dependents[id].iter().copied().collect();
        let mut result = Vec::new();
        while let Some(next) = queue.pop_front() {
            if seen[next] {
                continue;
            }
            seen[next] = true;
            result.push(next);
            queue.extend(self.dependents[next].iter().copied());
        }
        result.sort_unstable();
        result
    }
}

/// Kahn's algorithm with a min-heap so equal-rank units keep source order.
/// Returns `None` when some unit never reaches in-degree zero.
fn topological_order(
    dependencies: &[Vec<UnitId>],
    dependents: &[Vec<UnitId>],
) -> Option<Vec<UnitId>> {
    let mut pending: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut heap: BinaryHeap<Reverse<UnitId>> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(id)) = heap.pop() {
        order.push(id);
        for &dependent in &dependents[id] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                heap.push(Reverse(dependent));
            }
        }
    }

    (order.len() == dependencies.len()).then_some(order)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Finished,
}

/// DFS colouring; returns the units of one cycle, each importing the next.
fn find_cycle(dependencies: &[Vec<UnitId>]) -> Vec<UnitId> {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];
    let mut stack = Vec::new();
    for start in 0..dependencies.len() {
        if marks[start] == Mark::Unvisited
            && let Some(cycle) = visit(start, dependencies, &mut marks, &mut stack)
        {
            return cycle;
        }
    }
    Vec::new()
}

fn visit(
    id: UnitId,
    dependencies: &[Vec<UnitId>],
    marks: &mut [Mark],
    stack: &mut Vec<UnitId>,
) -> Option<Vec<UnitId>> {
    marks[id] = Mark::InProgress;
    stack.push(id);
    for &dep in &dependencies[id] {
        match marks[dep] {
            Mark::InProgress => {
                let start = stack.iter().position(|&s| s == dep)?;
                return Some(stack[start..].to_vec());
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(dep, dependencies, marks, stack) {
                    return Some(cycle);
                }
            }
            Mark::Finished => {}
        }
    }
    stack.pop();
    marks[id] = Mark::Finished;
    None
}
