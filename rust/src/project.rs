//! The project: owner of the item arena and entry point for every mutation.
//!
//! Each public mutation leaves the tree, the declared relations and the
//! computed dates consistent before returning. Failed mutations restore the
//! arena to its exact previous state.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::aggregate::{self, CostDistribution};
use crate::config::EngineConfig;
use crate::critical_path::find_critical_paths;
use crate::error::ScheduleError;
use crate::forward_pass::{forward_pass, DateBasis};
use crate::graph::{tree_order, DependencyGraph};
use crate::models::{
    is_reserved_id, CriticalPath, Item, ItemEdit, ItemId, ItemKind, ItemMap, NewItem, Schedule,
    END_MILESTONE_ID, ROOT_ID, START_MILESTONE_ID,
};
use crate::{log_changes, log_debug};

/// A scheduled project.
///
/// Owned by its caller; there is no process-wide instance.
#[derive(Debug, Clone)]
pub struct Project {
    id: i64,
    title: String,
    subtitle: Option<String>,
    start_date: NaiveDate,
    items: ItemMap,
    critical_paths: Vec<CriticalPath>,
    /// End of the schedule when actual-date overrides are ignored.
    baseline_end: NaiveDate,
    config: EngineConfig,
}

impl Project {
    pub fn new(id: i64, title: impl Into<String>, start_date: NaiveDate) -> Self {
        Self::with_config(id, title, start_date, EngineConfig::default())
    }

    pub fn with_config(
        id: i64,
        title: impl Into<String>,
        start_date: NaiveDate,
        config: EngineConfig,
    ) -> Self {
        let mut items = ItemMap::default();
        items.insert(ROOT_ID, Item::container(ROOT_ID, "root"));
        items.insert(
            START_MILESTONE_ID,
            Item::milestone(START_MILESTONE_ID, "Start"),
        );
        items.insert(END_MILESTONE_ID, Item::milestone(END_MILESTONE_ID, "End"));

        let mut project = Self {
            id,
            title: title.into(),
            subtitle: None,
            start_date,
            items,
            critical_paths: Vec::new(),
            baseline_end: start_date,
            config,
        };
        project.recompute();
        project
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    pub fn set_subtitle(&mut self, subtitle: Option<String>) {
        self.subtitle = subtitle;
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn set_start_date(&mut self, start_date: NaiveDate) {
        self.start_date = start_date;
        self.recompute();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The whole arena, synthetic items included.
    pub fn items(&self) -> &ItemMap {
        &self.items
    }

    pub fn get_item(&self, id: ItemId) -> Result<&Item, ScheduleError> {
        self.items.get(&id).ok_or(ScheduleError::ItemNotFound(id))
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> Result<&mut Item, ScheduleError> {
        self.items
            .get_mut(&id)
            .ok_or(ScheduleError::ItemNotFound(id))
    }

    /// Insert a new item as the last child of `parent_id`, then relate its
    /// declared predecessors.
    pub fn add_item(&mut self, parent_id: ItemId, item: NewItem) -> Result<(), ScheduleError> {
        let snapshot = self.items.clone();
        match self.add_item_unchecked(parent_id, item) {
            Ok(()) => {
                self.recompute();
                Ok(())
            }
            Err(err) => {
                self.items = snapshot;
                Err(err)
            }
        }
    }

    fn add_item_unchecked(&mut self, parent_id: ItemId, item: NewItem) -> Result<(), ScheduleError> {
        let id = item.id;
        let predecessors = item.predecessors.clone();
        self.insert_item(parent_id, item)?;

        // Relations declared on an ancestor apply to the new item at once and
        // may close a cycle that was latent while the container was empty.
        DependencyGraph::from_project(self).topological_order()?;

        for pred in predecessors {
            self.link(pred, id)?;
        }
        Ok(())
    }

    /// Structural insertion only: no relations, no recompute.
    pub(crate) fn insert_item(
        &mut self,
        parent_id: ItemId,
        item: NewItem,
    ) -> Result<(), ScheduleError> {
        if is_reserved_id(item.id) {
            return Err(ScheduleError::invalid(format!(
                "item id {} is reserved; ids must be positive",
                item.id
            )));
        }
        if self.items.contains_key(&item.id) {
            return Err(ScheduleError::DuplicateItem(item.id));
        }
        check_cost(item.id, item.cost)?;
        if !item.kind.children().is_empty() {
            return Err(ScheduleError::invalid(format!(
                "container {} must be inserted empty",
                item.id
            )));
        }

        let parent = self.item_mut(parent_id)?;
        let ItemKind::Container { children, .. } = &mut parent.kind else {
            return Err(ScheduleError::invalid(format!(
                "item {} is not a container",
                parent_id
            )));
        };
        children.push(item.id);

        let mut kind = item.kind;
        if let Some(schedule) = kind.schedule_mut() {
            schedule.calculated_start = None;
        }
        let mut new_item = Item::new(item.id, item.name, kind);
        new_item.detail = item.detail;
        new_item.cost = item.cost;
        new_item.parent = Some(parent_id);
        log_changes!(
            self.config.verbosity,
            "Added {} {} under {}",
            new_item.item_type(),
            new_item.id,
            parent_id
        );
        self.items.insert(new_item.id, new_item);
        Ok(())
    }

    /// Apply a partial update.
    ///
    /// Type and parent cannot change through this path. Manual dates are
    /// rejected on containers, durations on anything but tasks, the manual
    /// cost flag on anything but containers. A new predecessor set goes
    /// through relation validation as a whole.
    pub fn edit_item(&mut self, id: ItemId, edit: ItemEdit) -> Result<(), ScheduleError> {
        let snapshot = self.items.clone();
        match self.apply_edit(id, edit) {
            Ok(()) => {
                self.recompute();
                Ok(())
            }
            Err(err) => {
                self.items = snapshot;
                Err(err)
            }
        }
    }

    fn apply_edit(&mut self, id: ItemId, edit: ItemEdit) -> Result<(), ScheduleError> {
        if is_reserved_id(id) {
            return Err(ScheduleError::invalid(format!(
                "synthetic item {} cannot be edited",
                id
            )));
        }
        let current = self.get_item(id)?;
        if let Some(item_type) = edit.item_type {
            if item_type != current.item_type() {
                return Err(ScheduleError::invalid(format!(
                    "cannot change item {} from {} to {}; delete and recreate it",
                    id,
                    current.item_type(),
                    item_type
                )));
            }
        }
        if let Some(parent) = edit.parent {
            if Some(parent) != current.parent {
                return Err(ScheduleError::invalid(format!(
                    "cannot move item {} to {}; delete and recreate it",
                    id, parent
                )));
            }
        }
        if let Some(cost) = edit.cost {
            check_cost(id, cost)?;
        }

        let item = self.item_mut(id)?;
        if let Some(name) = edit.name {
            item.name = name;
        }
        if let Some(detail) = edit.detail {
            item.detail = detail;
        }
        if let Some(cost) = edit.cost {
            item.cost = cost;
        }
        if let Some(flag) = edit.manual_cost {
            let ItemKind::Container { manual_cost, .. } = &mut item.kind else {
                return Err(ScheduleError::invalid(format!(
                    "item {} is not a container and has no manual cost flag",
                    id
                )));
            };
            *manual_cost = flag;
        }
        if edit.duration.is_some() || edit.manual_duration.is_some() {
            let ItemKind::Task {
                duration,
                manual_duration,
                ..
            } = &mut item.kind
            else {
                return Err(ScheduleError::invalid(format!(
                    "item {} is not a task and has no duration",
                    id
                )));
            };
            if let Some(value) = edit.duration {
                *duration = value;
            }
            if let Some(value) = edit.manual_duration {
                *manual_duration = value;
            }
        }
        if let Some(actual) = edit.actual_start {
            let Some(schedule) = item.kind.schedule_mut() else {
                return Err(ScheduleError::invalid(format!(
                    "container {} dates are derived from its children",
                    id
                )));
            };
            schedule.actual_start = actual;
        }

        if let Some(predecessors) = edit.predecessors {
            item.predecessors.clear();
            for pred in predecessors {
                self.link(pred, id)?;
            }
        }
        Ok(())
    }

    /// Override (or clear) the actual start of a task or milestone.
    pub fn set_actual_start_date(
        &mut self,
        id: ItemId,
        date: Option<NaiveDate>,
    ) -> Result<(), ScheduleError> {
        self.edit_item(
            id,
            ItemEdit {
                actual_start: Some(date),
                ..ItemEdit::default()
            },
        )
    }

    /// Remove an item with its whole subtree and every relation touching it.
    pub fn delete_item(&mut self, id: ItemId) -> Result<(), ScheduleError> {
        if is_reserved_id(id) {
            return Err(ScheduleError::invalid(format!(
                "synthetic item {} cannot be deleted",
                id
            )));
        }
        let parent = self.get_item(id)?.parent;

        let mut removed = vec![id];
        let mut cursor = 0;
        while cursor < removed.len() {
            if let Some(item) = self.items.get(&removed[cursor]) {
                removed.extend_from_slice(item.kind.children());
            }
            cursor += 1;
        }

        if let Some(ItemKind::Container { children, .. }) =
            parent.and_then(|p| self.items.get_mut(&p)).map(|p| &mut p.kind)
        {
            children.retain(|&child| child != id);
        }
        for removed_id in &removed {
            self.items.remove(removed_id);
        }
        for item in self.items.values_mut() {
            item.predecessors.retain(|pred| !removed.contains(pred));
        }
        log_changes!(
            self.config.verbosity,
            "Deleted item {} ({} items removed)",
            id,
            removed.len()
        );
        self.recompute();
        Ok(())
    }

    /// Rebuild the graph, re-date every terminal item and re-mark critical paths.
    pub fn recompute(&mut self) {
        let graph = DependencyGraph::from_project(self);
        let verbosity = self.config.verbosity;

        let dated = forward_pass(
            &graph,
            &self.items,
            self.start_date,
            DateBasis::Displayed,
            verbosity,
        );
        for (&id, &start) in &dated.calculated_starts {
            if let Some(schedule) = self
                .items
                .get_mut(&id)
                .and_then(|item| item.kind.schedule_mut())
            {
                schedule.calculated_start = Some(start);
            }
        }

        let baseline = forward_pass(
            &graph,
            &self.items,
            self.start_date,
            DateBasis::Planned,
            verbosity,
        );
        self.baseline_end = baseline
            .latest_end(&self.items, graph.nodes().iter().copied(), DateBasis::Planned)
            .unwrap_or(self.start_date);

        let paths = find_critical_paths(
            &graph,
            &self.items,
            START_MILESTONE_ID,
            END_MILESTONE_ID,
            &self.config,
        );
        for item in self.items.values_mut() {
            item.critical = false;
        }
        for path in &paths {
            for id in &path.path {
                if let Some(item) = self.items.get_mut(id) {
                    item.critical = true;
                }
            }
        }
        self.critical_paths = paths
            .into_iter()
            .map(|mut path| {
                path.path.retain(|&id| !is_reserved_id(id));
                path
            })
            .filter(|path| !path.path.is_empty())
            .collect();

        log_debug!(
            verbosity,
            "Recomputed {} graph nodes, baseline end {}",
            graph.len(),
            self.baseline_end
        );
        log_changes!(
            verbosity,
            "Project {}: end {:?}, {} critical path(s)",
            self.id,
            self.end_date(),
            self.critical_paths.len()
        );
    }

    /// Critical paths of the last recompute, synthetic milestones left out.
    pub fn critical_paths(&self) -> &[CriticalPath] {
        &self.critical_paths
    }

    pub fn item_start_date(&self, id: ItemId) -> Result<Option<NaiveDate>, ScheduleError> {
        self.get_item(id)?;
        Ok(aggregate::start_date(&self.items, id))
    }

    pub fn item_end_date(&self, id: ItemId) -> Result<Option<NaiveDate>, ScheduleError> {
        self.get_item(id)?;
        Ok(aggregate::end_date(&self.items, id))
    }

    pub fn total_cost(&self, id: ItemId) -> Result<f64, ScheduleError> {
        self.get_item(id)?;
        Ok(aggregate::total_cost(&self.items, id))
    }

    /// Per-day cost of an item. `method` is one of `uniform`,
    /// `front_loaded` or `back_loaded`.
    pub fn cost_per_day(
        &self,
        id: ItemId,
        method: &str,
    ) -> Result<BTreeMap<NaiveDate, f64>, ScheduleError> {
        self.get_item(id)?;
        let method: CostDistribution = method.parse()?;
        Ok(aggregate::daily_costs(&self.items, id, method))
    }

    pub fn delay_days(&self, id: ItemId) -> Result<i64, ScheduleError> {
        Ok(self.get_item(id)?.delay_days())
    }

    /// Calculated end of the project (start of the end milestone).
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.items
            .get(&END_MILESTONE_ID)
            .and_then(|item| item.kind.schedule())
            .and_then(Schedule::start)
    }

    /// Days by which the latest end of any item overruns the baseline plan,
    /// floored at zero.
    pub fn total_delay_days(&self) -> i64 {
        let latest = tree_order(&self.items)
            .into_iter()
            .filter(|id| self.items.get(id).is_some_and(Item::is_terminal))
            .filter_map(|id| aggregate::end_date(&self.items, id))
            .max();
        match latest {
            Some(latest) => (latest - self.baseline_end).num_days().max(0),
            None => 0,
        }
    }

    /// Every item under the root in display order with its depth
    /// (root-level items have depth 0).
    pub fn flatten(&self) -> Vec<(usize, &Item)> {
        let mut out = Vec::with_capacity(self.items.len());
        if let Some(root) = self.items.get(&ROOT_ID) {
            self.flatten_into(root.kind.children(), 0, &mut out);
        }
        out
    }

    fn flatten_into<'a>(&'a self, ids: &[ItemId], depth: usize, out: &mut Vec<(usize, &'a Item)>) {
        for id in ids {
            if let Some(item) = self.items.get(id) {
                out.push((depth, item));
                self.flatten_into(item.kind.children(), depth + 1, out);
            }
        }
    }

    /// Items marked critical by the last recompute, in display order.
    pub fn critical_items(&self) -> Vec<&Item> {
        self.flatten()
            .into_iter()
            .map(|(_, item)| item)
            .filter(|item| item.critical)
            .collect()
    }
}

fn check_cost(id: ItemId, cost: Option<f64>) -> Result<(), ScheduleError> {
    match cost {
        Some(value) if !(value >= 0.0) => Err(ScheduleError::validation(format!(
            "item {} has invalid cost {}",
            id, value
        ))),
        _ => Ok(()),
    }
}
