//! Forward pass: earliest-start propagation over the dependency graph.

use chrono::{Days, NaiveDate};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::DependencyGraph;
use crate::log_debug;
use crate::models::{ItemId, ItemMap};

/// Which end date a predecessor hands on to its successors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBasis {
    /// Displayed dates: actual starts win over calculated ones.
    Displayed,
    /// Calculated dates only, ignoring actual-date overrides (the baseline plan).
    Planned,
}

/// Result of the forward pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardPassResult {
    /// Calculated start for every node of the graph.
    pub calculated_starts: FxHashMap<ItemId, NaiveDate>,
}

impl ForwardPassResult {
    /// Latest end date among the given nodes, using the same basis as the pass.
    pub fn latest_end(
        &self,
        items: &ItemMap,
        ids: impl IntoIterator<Item = ItemId>,
        basis: DateBasis,
    ) -> Option<NaiveDate> {
        ids.into_iter()
            .filter_map(|id| {
                let calculated = *self.calculated_starts.get(&id)?;
                Some(end_of(items, id, calculated, basis))
            })
            .max()
    }
}

struct Pass<'a> {
    graph: &'a DependencyGraph,
    items: &'a ItemMap,
    project_start: NaiveDate,
    basis: DateBasis,
    visited: FxHashSet<ItemId>,
    starts: FxHashMap<ItemId, NaiveDate>,
}

impl Pass<'_> {
    /// Resolve all predecessors of `node` depth-first, then take the latest of
    /// their end dates (never earlier than the project start).
    fn resolve(&mut self, node: ItemId) -> NaiveDate {
        if !self.visited.insert(node) {
            return self
                .starts
                .get(&node)
                .copied()
                .unwrap_or(self.project_start);
        }

        let mut start = self.project_start;
        for &pred in self.graph.predecessors(node) {
            let pred_start = self.resolve(pred);
            let pred_end = end_of(self.items, pred, pred_start, self.basis);
            if pred_end > start {
                start = pred_end;
            }
        }
        self.starts.insert(node, start);
        start
    }
}

/// End date of a terminal item given its calculated start.
fn end_of(items: &ItemMap, id: ItemId, calculated: NaiveDate, basis: DateBasis) -> NaiveDate {
    let Some(item) = items.get(&id) else {
        return calculated;
    };
    let begin = match basis {
        DateBasis::Displayed => item
            .kind
            .schedule()
            .and_then(|s| s.actual_start)
            .unwrap_or(calculated),
        DateBasis::Planned => calculated,
    };
    begin
        .checked_add_days(Days::new(item.kind.duration_days().into()))
        .unwrap_or(begin)
}

/// Assign every node of `graph` its calculated start date.
///
/// A node's start is the latest end among its predecessors, or the project
/// start when it has none. There is no lag: a successor starts exactly when
/// its latest predecessor ends. Each node is resolved once, so the pass is
/// O(V + E) regardless of fan-in.
///
/// The graph must be acyclic; `Project` guarantees this by validating every
/// relation before committing it.
pub fn forward_pass(
    graph: &DependencyGraph,
    items: &ItemMap,
    project_start: NaiveDate,
    basis: DateBasis,
    verbosity: u8,
) -> ForwardPassResult {
    let mut pass = Pass {
        graph,
        items,
        project_start,
        basis,
        visited: FxHashSet::with_capacity_and_hasher(graph.len(), Default::default()),
        starts: FxHashMap::with_capacity_and_hasher(graph.len(), Default::default()),
    };
    for &node in graph.nodes() {
        pass.resolve(node);
    }
    log_debug!(
        verbosity,
        "Forward pass ({:?}): {} nodes dated from {}",
        basis,
        pass.starts.len(),
        project_start
    );
    ForwardPassResult {
        calculated_starts: pass.starts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, Schedule};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn items_of(list: Vec<Item>) -> ItemMap {
        list.into_iter().map(|item| (item.id, item)).collect()
    }

    #[test]
    fn test_chain_has_no_lag() {
        let items = items_of(vec![Item::task(1, "a", 3), Item::task(2, "b", 2)]);
        let mut graph = DependencyGraph::new();
        graph.add_edge(1, 2);

        let result = forward_pass(&graph, &items, d(2024, 1, 1), DateBasis::Displayed, 0);
        assert_eq!(result.calculated_starts[&1], d(2024, 1, 1));
        assert_eq!(result.calculated_starts[&2], d(2024, 1, 4));
        assert_eq!(
            result.latest_end(&items, [1, 2], DateBasis::Displayed),
            Some(d(2024, 1, 6))
        );
    }

    #[test]
    fn test_latest_predecessor_wins() {
        // d depends on b (2 days) and c (5 days), both depend on a
        let items = items_of(vec![
            Item::task(1, "a", 1),
            Item::task(2, "b", 2),
            Item::task(3, "c", 5),
            Item::milestone(4, "d"),
        ]);
        let mut graph = DependencyGraph::new();
        graph.add_node(4);
        graph.add_edge(1, 2);
        graph.add_edge(1, 3);
        graph.add_edge(2, 4);
        graph.add_edge(3, 4);

        let result = forward_pass(&graph, &items, d(2024, 1, 1), DateBasis::Displayed, 0);
        assert_eq!(result.calculated_starts[&2], d(2024, 1, 2));
        assert_eq!(result.calculated_starts[&3], d(2024, 1, 2));
        assert_eq!(result.calculated_starts[&4], d(2024, 1, 7));
    }

    #[test]
    fn test_actual_start_shifts_successors_only_on_displayed_basis() {
        let mut late = Item::task(1, "a", 1);
        late.kind = crate::models::ItemKind::Task {
            schedule: Schedule {
                calculated_start: None,
                actual_start: Some(d(2024, 1, 3)),
            },
            duration: 1,
            manual_duration: None,
        };
        let items = items_of(vec![late, Item::task(2, "b", 1)]);
        let mut graph = DependencyGraph::new();
        graph.add_edge(1, 2);

        let displayed = forward_pass(&graph, &items, d(2024, 1, 1), DateBasis::Displayed, 0);
        assert_eq!(displayed.calculated_starts[&1], d(2024, 1, 1));
        assert_eq!(displayed.calculated_starts[&2], d(2024, 1, 4));

        let planned = forward_pass(&graph, &items, d(2024, 1, 1), DateBasis::Planned, 0);
        assert_eq!(planned.calculated_starts[&2], d(2024, 1, 2));
    }

    #[test]
    fn test_nodes_without_predecessors_take_project_start() {
        let items = items_of(vec![Item::task(1, "a", 4), Item::milestone(2, "m")]);
        let mut graph = DependencyGraph::new();
        graph.add_node(1);
        graph.add_node(2);

        let result = forward_pass(&graph, &items, d(2024, 3, 10), DateBasis::Displayed, 0);
        assert_eq!(result.calculated_starts[&1], d(2024, 3, 10));
        assert_eq!(result.calculated_starts[&2], d(2024, 3, 10));
    }
}
