//! The dependency graph: construction, cycle detection, topological sort,
//! and transitive dependency collection (§4.4).
//!
//! Node weights are owned `String`s rather than borrows into the
//! `FluxFile` arena: the graph still only reads the task list once at
//! construction time (§9's "borrowed references" intent), but avoids
//! threading an explicit lifetime through every traversal helper.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::ast::FluxFile;
use crate::error::GraphError;

pub struct Graph {
    graph: DiGraph<String, ()>,
    index_of: HashMap<String, NodeIndex>,
    order: Vec<String>,
}

impl Graph {
    pub fn build(file: &FluxFile) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();
        for task in &file.tasks {
            let idx = graph.add_node(task.name.clone());
            index_of.insert(task.name.clone(), idx);
        }
        for task in &file.tasks {
            let from = index_of[&task.name];
            for dep in &task.deps {
                let to = *index_of
                    .get(dep)
                    .ok_or_else(|| GraphError::UndefinedDependency(task.name.clone(), dep.clone()))?;
                graph.add_edge(from, to, ());
            }
        }

        let g = Graph {
            graph,
            index_of,
            order: file.tasks.iter().map(|t| t.name.clone()).collect(),
        };
        g.detect_cycle()?;
        Ok(g)
    }

    fn detect_cycle(&self) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        for name in &self.order {
            if !visited.contains(name) {
                self.dfs_cycle(name, &mut visited, &mut on_stack)?;
            }
        }
        Ok(())
    }

    fn dfs_cycle(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
    ) -> Result<(), GraphError> {
        on_stack.insert(name.to_string());
        let idx = self.index_of[name];
        for neighbor in self.graph.neighbors(idx) {
            let nname = &self.graph[neighbor];
            if on_stack.contains(nname) {
                return Err(GraphError::Cycle(nname.clone()));
            }
            if !visited.contains(nname) {
                self.dfs_cycle(&nname.clone(), visited, on_stack)?;
            }
        }
        on_stack.remove(name);
        visited.insert(name.to_string());
        Ok(())
    }

    /// A linearization in which every task follows its deps (§4.4, §8).
    pub fn topological_sort(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for name in &self.order {
            self.topo_visit(name, &mut visited, &mut order);
        }
        order
    }

    fn topo_visit(&self, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if visited.contains(name) {
            return;
        }
        visited.insert(name.to_string());
        let idx = self.index_of[name];
        let neighbors: Vec<String> = self.graph.neighbors(idx).map(|n| self.graph[n].clone()).collect();
        for nname in neighbors {
            self.topo_visit(&nname, visited, order);
        }
        order.push(name.to_string());
    }

    /// Strict ancestors of `root` in DFS post-order, de-duplicated, root
    /// excluded (§4.4).
    pub fn transitive_deps(&self, root: &str) -> Result<Vec<String>, GraphError> {
        let idx = *self
            .index_of
            .get(root)
            .ok_or_else(|| GraphError::UnknownTask(root.to_string()))?;
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let neighbors: Vec<String> = self.graph.neighbors(idx).map(|n| self.graph[n].clone()).collect();
        for nname in neighbors {
            self.topo_visit(&nname, &mut visited, &mut order);
        }
        Ok(order)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of.contains_key(name)
    }
}
