//! Dependency graph construction and the read-only presentation surface.
//!
//! The topology is validated and frozen here: after `TaskGraph::build`
//! returns, only node contents change, and only through each node's own
//! executor worker.

use dagrun_core::{Error, Result};
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::Arc;

use crate::node::{TaskNode, TaskSnapshot};
use crate::process;

/// A validated directed acyclic graph of task nodes with precomputed
/// predecessor/successor sets and dependency counts.
#[derive(Debug)]
pub struct TaskGraph {
    nodes: Vec<Arc<TaskNode>>,
    index: HashMap<String, usize>,
    names: Vec<String>,
}

impl TaskGraph {
    /// Build a graph from a task → ordered-dependency-names mapping.
    ///
    /// Fails if any dependency names a task that is not itself a key of the
    /// mapping, or if the mapping contains a cycle.
    pub fn build(description: &IndexMap<String, Vec<String>>) -> Result<Self> {
        let mut names: Vec<String> = description.keys().cloned().collect();
        names.sort();

        let mut topo: DiGraph<usize, ()> = DiGraph::with_capacity(description.len(), 0);
        let mut petgraph_index: HashMap<&str, NodeIndex> =
            HashMap::with_capacity(description.len());
        for (position, task) in description.keys().enumerate() {
            petgraph_index.insert(task.as_str(), topo.add_node(position));
        }

        for (task, dependencies) in description {
            let target = petgraph_index[task.as_str()];
            for dependency in dependencies {
                let source = *petgraph_index
                    .get(dependency.as_str())
                    .ok_or_else(|| Error::unknown_task(dependency.as_str(), names.clone()))?;
                // A repeated dependency still counts as a single predecessor
                if !topo.contains_edge(source, target) {
                    topo.add_edge(source, target, ());
                }
            }
        }

        if let Err(cycle) = toposort(&topo, None) {
            let position = topo[cycle.node_id()];
            let task = description
                .get_index(position)
                .map(|(name, _)| name.clone())
                .unwrap_or_default();
            return Err(Error::cyclic_graph(task));
        }

        let nodes = description
            .keys()
            .enumerate()
            .map(|(position, task)| {
                let here = petgraph_index[task.as_str()];
                let mut predecessors: Vec<usize> = topo
                    .neighbors_directed(here, Direction::Incoming)
                    .map(|n| topo[n])
                    .collect();
                let mut successors: Vec<usize> = topo
                    .neighbors_directed(here, Direction::Outgoing)
                    .map(|n| topo[n])
                    .collect();
                predecessors.sort_unstable();
                successors.sort_unstable();
                debug_assert_eq!(topo[here], position);
                Arc::new(TaskNode::new(task.clone(), predecessors, successors))
            })
            .collect();

        let index = description
            .keys()
            .enumerate()
            .map(|(position, task)| (task.clone(), position))
            .collect();

        Ok(Self {
            nodes,
            index,
            names,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All task names, sorted
    pub fn task_names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn node(&self, index: usize) -> &Arc<TaskNode> {
        &self.nodes[index]
    }

    pub fn get(&self, task: &str) -> Option<&Arc<TaskNode>> {
        self.index.get(task).map(|&i| &self.nodes[i])
    }

    pub(crate) fn position(&self, task: &str) -> Result<usize> {
        self.index
            .get(task)
            .copied()
            .ok_or_else(|| Error::unknown_task(task, self.names.clone()))
    }

    /// Nodes with no successors; their recorded errors decide the overall
    /// run outcome.
    pub fn sinks(&self) -> impl Iterator<Item = &Arc<TaskNode>> {
        self.nodes.iter().filter(|n| n.successors.is_empty())
    }

    /// Point-in-time snapshots of every node, in sorted name order
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.names
            .iter()
            .filter_map(|name| self.get(name))
            .map(|node| node.snapshot())
            .collect()
    }

    /// Send the termination sequence to one task's running process group
    pub fn signal(&self, task: &str) -> Result<()> {
        let node = self
            .get(task)
            .ok_or_else(|| Error::unknown_task(task, self.names.clone()))?;
        let pgid = node
            .state
            .read()
            .pgid
            .ok_or_else(|| Error::scheduler(format!("task '{task}' has no running process")))?;
        process::terminate_group(pgid)
    }

    /// Terminate every task with a live process group (interactive shutdown)
    pub fn terminate_all(&self) {
        for node in &self.nodes {
            let pgid = node.state.read().pgid;
            if let Some(pgid) = pgid {
                if let Err(e) = process::terminate_group(pgid) {
                    tracing::debug!(task = node.name(), error = %e, "process group already gone");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(pairs: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(task, deps)| {
                (
                    task.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn builds_relations_and_dependency_counts() {
        let graph = TaskGraph::build(&description(&[
            ("compile", &[]),
            ("build", &["compile"]),
            ("test", &["compile"]),
            ("deploy", &["build", "test"]),
        ]))
        .unwrap();

        assert_eq!(graph.len(), 4);
        let compile = graph.get("compile").unwrap();
        assert!(compile.predecessors.is_empty());
        assert_eq!(compile.successors.len(), 2);
        assert_eq!(compile.gate.pending(), 0);

        let deploy = graph.get("deploy").unwrap();
        assert_eq!(deploy.predecessors.len(), 2);
        assert!(deploy.successors.is_empty());
        assert_eq!(deploy.gate.pending(), 2);

        let sinks: Vec<_> = graph.sinks().map(|n| n.name().to_string()).collect();
        assert_eq!(sinks, vec!["deploy"]);
    }

    #[test]
    fn unknown_dependency_lists_known_tasks() {
        let err = TaskGraph::build(&description(&[("build", &["missing"])])).unwrap_err();
        match err {
            Error::UnknownTask { task, known } => {
                assert_eq!(task, "missing");
                assert_eq!(known, vec!["build"]);
            }
            other => panic!("expected UnknownTask, got {other}"),
        }
    }

    #[test]
    fn cyclic_description_is_rejected() {
        let err = TaskGraph::build(&description(&[
            ("a", &["b"]),
            ("b", &["a"]),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::CyclicGraph { .. }));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = TaskGraph::build(&description(&[("a", &["a"])])).unwrap_err();
        assert!(matches!(err, Error::CyclicGraph { .. }));
    }

    #[test]
    fn repeated_dependency_counts_once() {
        let graph =
            TaskGraph::build(&description(&[("a", &[]), ("b", &["a", "a"])])).unwrap();
        assert_eq!(graph.get("b").unwrap().gate.pending(), 1);
    }

    #[test]
    fn signalling_an_idle_task_is_rejected() {
        let graph = TaskGraph::build(&description(&[("quiet", &[])])).unwrap();
        let err = graph.signal("quiet").unwrap_err();
        assert!(matches!(err, Error::Scheduler { .. }));
        assert!(matches!(
            graph.signal("ghost").unwrap_err(),
            Error::UnknownTask { .. }
        ));
    }

    #[test]
    fn task_names_are_sorted() {
        let graph = TaskGraph::build(&description(&[
            ("zeta", &[]),
            ("alpha", &[]),
            ("mid", &["zeta"]),
        ]))
        .unwrap();
        assert_eq!(graph.task_names(), ["alpha", "mid", "zeta"]);
    }
}
