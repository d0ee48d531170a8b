//! Container-aware relation expansion and the relation gateway.
//!
//! Relations are stored as declared, possibly between containers. Every
//! graph rebuild expands them into terminal-to-terminal edges, so a relation
//! declared on a container also applies to children added later.

use crate::error::ScheduleError;
use crate::graph::DependencyGraph;
use crate::models::{is_reserved_id, ItemId, ItemKind, ItemMap};
use crate::project::Project;
use crate::{log_changes, log_checks};

/// A relation that is dropped without error: an item with itself, or a
/// container with one of its own direct children.
pub(crate) fn is_redundant(items: &ItemMap, a: ItemId, b: ItemId) -> bool {
    let parent_of = |id: ItemId| items.get(&id).and_then(|item| item.parent);
    a == b || parent_of(a) == Some(b) || parent_of(b) == Some(a)
}

/// Expand a declared relation into terminal edges `(predecessor, successor)`.
///
/// A container predecessor stands for each of its children; a container
/// successor stands for each of its children except the predecessor itself.
/// Redundant pairs are skipped at every level of the recursion.
pub fn expand_relation(
    items: &ItemMap,
    predecessor: ItemId,
    successor: ItemId,
) -> Vec<(ItemId, ItemId)> {
    let mut edges = Vec::new();
    expand_into(items, predecessor, successor, &mut edges);
    edges
}

fn expand_into(
    items: &ItemMap,
    predecessor: ItemId,
    successor: ItemId,
    edges: &mut Vec<(ItemId, ItemId)>,
) {
    if is_redundant(items, predecessor, successor) {
        return;
    }
    let (Some(pred), Some(succ)) = (items.get(&predecessor), items.get(&successor)) else {
        return;
    };

    if let ItemKind::Container { children, .. } = &pred.kind {
        for &child in children {
            expand_into(items, child, successor, edges);
        }
        return;
    }
    if let ItemKind::Container { children, .. } = &succ.kind {
        for &child in children {
            if child != predecessor {
                expand_into(items, predecessor, child, edges);
            }
        }
        return;
    }

    if !edges.contains(&(predecessor, successor)) {
        edges.push((predecessor, successor));
    }
}

impl Project {
    /// Declare that `predecessor` finishes before `successor` starts.
    ///
    /// Redundant relations are ignored. Fails with `CycleDetected` when any
    /// expanded edge would close a cycle; nothing is recorded in that case.
    pub fn add_relation(
        &mut self,
        predecessor: ItemId,
        successor: ItemId,
    ) -> Result<(), ScheduleError> {
        if self.link(predecessor, successor)? {
            self.recompute();
        }
        Ok(())
    }

    /// Drop a declared relation. Unknown pairs are ignored.
    pub fn remove_relation(
        &mut self,
        predecessor: ItemId,
        successor: ItemId,
    ) -> Result<(), ScheduleError> {
        self.get_item(predecessor)?;
        let item = self.item_mut(successor)?;
        let before = item.predecessors.len();
        item.predecessors.retain(|&p| p != predecessor);
        if item.predecessors.len() != before {
            log_changes!(
                self.config().verbosity,
                "Removed relation {} -> {}",
                predecessor,
                successor
            );
            self.recompute();
        }
        Ok(())
    }

    /// Validate and record a relation without recomputing dates.
    ///
    /// Expands the relation to terminal edges, installs them on a fresh graph
    /// of the current project and checks it for cycles. Only then is the
    /// predecessor added to the successor's declared set. Returns whether
    /// anything was recorded.
    pub(crate) fn link(
        &mut self,
        predecessor: ItemId,
        successor: ItemId,
    ) -> Result<bool, ScheduleError> {
        self.check_relatable(predecessor)?;
        self.check_relatable(successor)?;
        let verbosity = self.config().verbosity;

        if is_redundant(self.items(), predecessor, successor) {
            log_checks!(
                verbosity,
                "Ignoring redundant relation {} -> {}",
                predecessor,
                successor
            );
            return Ok(false);
        }
        if self.get_item(successor)?.predecessors.contains(&predecessor) {
            return Ok(false);
        }

        let candidates = expand_relation(self.items(), predecessor, successor);
        let mut graph = DependencyGraph::from_project(self);
        for &(from, to) in &candidates {
            graph.add_edge(from, to);
        }
        if let Err(err) = graph.topological_order() {
            log_checks!(
                verbosity,
                "Rejecting relation {} -> {}: {}",
                predecessor,
                successor,
                err
            );
            return Err(err.into());
        }

        self.item_mut(successor)?.predecessors.push(predecessor);
        log_changes!(
            verbosity,
            "Added relation {} -> {} ({} terminal edges)",
            predecessor,
            successor,
            candidates.len()
        );
        Ok(true)
    }

    fn check_relatable(&self, id: ItemId) -> Result<(), ScheduleError> {
        if is_reserved_id(id) {
            return Err(ScheduleError::invalid(format!(
                "synthetic item {} cannot take part in a relation",
                id
            )));
        }
        self.get_item(id).map(|_| ())
    }
}
