//! Critical path search over a dated dependency graph.
//!
//! A depth-first search from the start milestone follows only zero-slack
//! edges. Every walk that reaches the end milestone is a candidate; candidates
//! contained as an ordered subsequence in a longer candidate are dropped.

use chrono::Duration;
use std::cmp::Reverse;

use crate::aggregate::end_date;
use crate::config::EngineConfig;
use crate::graph::DependencyGraph;
use crate::models::{CriticalPath, ItemId, ItemMap};
use crate::{log_checks, log_debug};

/// Whether the edge `current -> next` carries no float.
///
/// Dates have day resolution, so any gap below one day counts as zero slack.
/// A negative gap (a late predecessor overrunning its successor's start)
/// breaks the chain just like a positive one.
pub fn is_zero_slack(gap: Duration) -> bool {
    gap >= Duration::zero() && gap < Duration::days(1)
}

struct Search<'a> {
    graph: &'a DependencyGraph,
    items: &'a ItemMap,
    end_id: ItemId,
    prioritize_delayed: bool,
    verbosity: u8,
    path: Vec<ItemId>,
    candidates: Vec<Vec<ItemId>>,
}

impl Search<'_> {
    fn delay_of(&self, id: ItemId) -> i64 {
        self.items.get(&id).map(|item| item.delay_days()).unwrap_or(0)
    }

    fn explore(&mut self, current: ItemId) {
        self.path.push(current);

        if current == self.end_id {
            log_debug!(self.verbosity, "  Critical candidate: {:?}", self.path);
            self.candidates.push(self.path.clone());
            self.path.pop();
            return;
        }

        // Undated nodes only occur with partial state; the branch just ends.
        let Some(current_end) = end_date(self.items, current) else {
            self.path.pop();
            return;
        };

        let mut successors = self.graph.successors(current).to_vec();
        if self.prioritize_delayed {
            successors.sort_by_key(|&id| Reverse(self.delay_of(id)));
        }

        for next in successors {
            let Some(next_start) = self
                .items
                .get(&next)
                .and_then(|item| item.kind.schedule())
                .and_then(|schedule| schedule.calculated_start)
            else {
                continue;
            };
            if is_zero_slack(next_start - current_end) {
                self.explore(next);
            }
        }

        self.path.pop();
    }
}

/// Whether `short` appears in `long` in order (not necessarily contiguously).
fn is_subsequence(short: &[ItemId], long: &[ItemId]) -> bool {
    let mut remaining = long.iter();
    short.iter().all(|id| remaining.any(|other| other == id))
}

/// Keep only candidates that are not a subsequence of a longer candidate.
fn retain_maximal(candidates: Vec<Vec<ItemId>>) -> Vec<Vec<ItemId>> {
    let maximal: Vec<bool> = candidates
        .iter()
        .enumerate()
        .map(|(i, path)| {
            !candidates.iter().enumerate().any(|(j, other)| {
                i != j && other.len() > path.len() && is_subsequence(path, other)
            })
        })
        .collect();
    candidates
        .into_iter()
        .zip(maximal)
        .filter_map(|(path, keep)| keep.then_some(path))
        .collect()
}

/// Find every maximal critical path from `start_id` to `end_id`.
///
/// Expects the graph to have been dated by the forward pass. Paths include
/// both endpoints. With `prioritize_delayed` the most overdue successor is
/// explored first; this changes discovery order only, never the result set.
pub fn find_critical_paths(
    graph: &DependencyGraph,
    items: &ItemMap,
    start_id: ItemId,
    end_id: ItemId,
    config: &EngineConfig,
) -> Vec<CriticalPath> {
    let mut search = Search {
        graph,
        items,
        end_id,
        prioritize_delayed: config.prioritize_delayed,
        verbosity: config.verbosity,
        path: Vec::new(),
        candidates: Vec::new(),
    };
    if graph.contains(start_id) {
        search.explore(start_id);
    }

    let found = search.candidates.len();
    let paths: Vec<CriticalPath> = retain_maximal(search.candidates)
        .into_iter()
        .map(|path| {
            let total_delay_days = path
                .iter()
                .map(|id| items.get(id).map(|item| item.delay_days()).unwrap_or(0))
                .sum();
            CriticalPath {
                path,
                total_delay_days,
            }
        })
        .collect();

    log_checks!(
        config.verbosity,
        "Critical path search: {} candidates, {} maximal",
        found,
        paths.len()
    );
    paths
}
