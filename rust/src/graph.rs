//! Dependency graph over terminal items.
//!
//! The graph is a disposable value: it is rebuilt from the project for every
//! validation and every recompute and never cached across mutations.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::error::ScheduleError;
use crate::models::{ItemId, ItemMap, END_MILESTONE_ID, ROOT_ID, START_MILESTONE_ID};
use crate::project::Project;
use crate::relation::expand_relation;

/// Errors raised by graph traversal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cycle detected at item {0}")]
    CycleDetected(ItemId),
}

impl From<GraphError> for ScheduleError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CycleDetected(id) => ScheduleError::CycleDetected(id),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Directed graph where an edge `a -> b` means "a finishes before b starts".
///
/// Forward and reverse adjacency are both kept so neighbor lookup is O(1) in
/// either direction. Neighbor lists keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<ItemId>,
    successors: FxHashMap<ItemId, Vec<ItemId>>,
    predecessors: FxHashMap<ItemId, Vec<ItemId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Idempotent.
    pub fn add_node(&mut self, id: ItemId) {
        if !self.successors.contains_key(&id) {
            self.nodes.push(id);
            self.successors.insert(id, Vec::new());
            self.predecessors.insert(id, Vec::new());
        }
    }

    /// Register the edge `from -> to`, adding missing endpoints.
    ///
    /// Cycles are not detected here; run `topological_order` after inserting
    /// candidate edges.
    pub fn add_edge(&mut self, from: ItemId, to: ItemId) {
        self.add_node(from);
        self.add_node(to);
        let succs = self.successors.entry(from).or_default();
        if succs.contains(&to) {
            return;
        }
        succs.push(to);
        self.predecessors.entry(to).or_default().push(from);
    }

    pub fn successors(&self, id: ItemId) -> &[ItemId] {
        self.successors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: ItemId) -> &[ItemId] {
        self.predecessors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.successors.contains_key(&id)
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> &[ItemId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node after all of its transitive predecessors.
    ///
    /// Depth-first post-order over predecessor edges with three colors
    /// (absent = unvisited). Reaching an in-progress node means the graph has
    /// a cycle through it.
    pub fn topological_order(&self) -> Result<Vec<ItemId>, GraphError> {
        let mut marks: FxHashMap<ItemId, Mark> =
            FxHashMap::with_capacity_and_hasher(self.nodes.len(), Default::default());
        let mut order = Vec::with_capacity(self.nodes.len());
        for &node in &self.nodes {
            if !marks.contains_key(&node) {
                self.visit(node, &mut marks, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: ItemId,
        marks: &mut FxHashMap<ItemId, Mark>,
        order: &mut Vec<ItemId>,
    ) -> Result<(), GraphError> {
        marks.insert(node, Mark::InProgress);
        for &pred in self.predecessors(node) {
            match marks.get(&pred) {
                Some(Mark::InProgress) => return Err(GraphError::CycleDetected(pred)),
                Some(Mark::Done) => {}
                None => self.visit(pred, marks, order)?,
            }
        }
        marks.insert(node, Mark::Done);
        order.push(node);
        Ok(())
    }

    /// Build the graph for a project.
    pub fn from_project(project: &Project) -> Self {
        Self::from_items(project.items())
    }

    /// Build the graph from an item arena.
    ///
    /// Nodes are every terminal item in tree order plus the synthetic start
    /// and end milestones. Declared relations are expanded to terminal edges;
    /// the start milestone precedes every terminal without predecessors and
    /// every terminal without successors precedes the end milestone.
    /// Containers never become nodes.
    pub fn from_items(items: &ItemMap) -> Self {
        let mut graph = Self::new();
        graph.add_node(START_MILESTONE_ID);

        let tree = tree_order(items);
        let terminals: Vec<ItemId> = tree
            .iter()
            .copied()
            .filter(|id| items.get(id).is_some_and(|item| item.is_terminal()))
            .collect();
        for &id in &terminals {
            graph.add_node(id);
        }
        graph.add_node(END_MILESTONE_ID);

        for &id in &tree {
            let Some(item) = items.get(&id) else {
                continue;
            };
            for &pred in &item.predecessors {
                for (from, to) in expand_relation(items, pred, id) {
                    graph.add_edge(from, to);
                }
            }
        }

        for &id in &terminals {
            if graph.predecessors(id).is_empty() {
                graph.add_edge(START_MILESTONE_ID, id);
            }
        }
        for &id in &terminals {
            if graph.successors(id).is_empty() {
                graph.add_edge(id, END_MILESTONE_ID);
            }
        }
        if terminals.is_empty() {
            graph.add_edge(START_MILESTONE_ID, END_MILESTONE_ID);
        }
        graph
    }
}

/// Ids of every item under the root in display order (pre-order), root excluded.
pub(crate) fn tree_order(items: &ItemMap) -> Vec<ItemId> {
    let mut order = Vec::with_capacity(items.len());
    let mut stack: Vec<ItemId> = Vec::new();
    if let Some(root) = items.get(&ROOT_ID) {
        stack.extend(root.kind.children().iter().rev());
    }
    let mut seen: FxHashSet<ItemId> = FxHashSet::default();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        if let Some(item) = items.get(&id) {
            stack.extend(item.kind.children().iter().rev());
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;

    fn position(order: &[ItemId], id: ItemId) -> usize {
        order.iter().position(|&x| x == id).unwrap()
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = DependencyGraph::new();
        graph.add_node(1);
        graph.add_edge(1, 2);
        graph.add_node(1);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.successors(1), &[2]);
    }

    #[test]
    fn test_neighbors_keep_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(1, 3);
        graph.add_edge(1, 2);
        graph.add_edge(4, 2);
        graph.add_edge(1, 3);
        assert_eq!(graph.successors(1), &[3, 2]);
        assert_eq!(graph.predecessors(2), &[1, 4]);
        assert!(graph.successors(99).is_empty());
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let mut graph = DependencyGraph::new();
        for id in [4, 3, 2, 1] {
            graph.add_node(id);
        }
        graph.add_edge(1, 2);
        graph.add_edge(1, 3);
        graph.add_edge(2, 4);
        graph.add_edge(3, 4);

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, 1) < position(&order, 2));
        assert!(position(&order, 1) < position(&order, 3));
        assert!(position(&order, 2) < position(&order, 4));
        assert!(position(&order, 3) < position(&order, 4));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(1, 2);
        graph.add_edge(2, 3);
        graph.add_edge(3, 1);
        assert!(matches!(
            graph.topological_order(),
            Err(GraphError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(5, 5);
        assert_eq!(graph.topological_order(), Err(GraphError::CycleDetected(5)));
    }

    fn attach(items: &mut ItemMap, parent: ItemId, mut item: Item) {
        item.parent = Some(parent);
        if let Some(p) = items.get_mut(&parent) {
            if let crate::models::ItemKind::Container { children, .. } = &mut p.kind {
                children.push(item.id);
            }
        }
        items.insert(item.id, item);
    }

    #[test]
    fn test_from_items_skips_containers_and_wires_synthetic_milestones() {
        let mut items = ItemMap::default();
        items.insert(ROOT_ID, Item::container(ROOT_ID, "root"));
        attach(&mut items, ROOT_ID, Item::task(1, "a", 3));
        attach(&mut items, ROOT_ID, Item::container(10, "group"));
        attach(&mut items, 10, Item::task(2, "b", 2));
        attach(&mut items, 10, Item::milestone(3, "m"));
        // group depends on a
        if let Some(group) = items.get_mut(&10) {
            group.predecessors.push(1);
        }

        let graph = DependencyGraph::from_items(&items);
        assert!(!graph.contains(10));
        assert!(!graph.contains(ROOT_ID));
        assert_eq!(graph.successors(START_MILESTONE_ID), &[1]);
        assert_eq!(graph.successors(1), &[2, 3]);
        assert_eq!(graph.predecessors(END_MILESTONE_ID), &[2, 3]);
        assert!(graph.topological_order().is_ok());
    }

    #[test]
    fn test_empty_project_links_start_to_end() {
        let mut items = ItemMap::default();
        items.insert(ROOT_ID, Item::container(ROOT_ID, "root"));
        let graph = DependencyGraph::from_items(&items);
        assert_eq!(graph.successors(START_MILESTONE_ID), &[END_MILESTONE_ID]);
    }

    #[test]
    fn test_tree_order_is_preorder() {
        let mut items = ItemMap::default();
        items.insert(ROOT_ID, Item::container(ROOT_ID, "root"));
        attach(&mut items, ROOT_ID, Item::container(10, "g"));
        attach(&mut items, 10, Item::task(1, "a", 1));
        attach(&mut items, ROOT_ID, Item::task(2, "b", 1));
        attach(&mut items, 10, Item::task(3, "c", 1));
        assert_eq!(tree_order(&items), vec![10, 1, 3, 2]);
    }
}
