//! Critical Path Method engine for hierarchical project plans.
//!
//! Projects own a flat arena of tasks, milestones and containers. Every
//! mutation revalidates dependencies, re-runs the forward pass and marks the
//! critical paths. The `rust` Python module exposes the `Project` type.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDate;
use pyo3::exceptions::{PyKeyError, PyValueError};
use pyo3::prelude::*;
use std::collections::BTreeMap;

pub mod aggregate;
mod config;
pub mod critical_path;
mod error;
pub mod forward_pass;
pub mod graph;
pub mod logging;
pub mod models;
mod project;
pub mod record;
pub mod relation;

pub use aggregate::CostDistribution;
pub use config::EngineConfig;
pub use critical_path::find_critical_paths;
pub use error::ScheduleError;
pub use forward_pass::{forward_pass, DateBasis, ForwardPassResult};
pub use graph::{DependencyGraph, GraphError};
pub use models::{
    CriticalPath, Item, ItemEdit, ItemId, ItemKind, ItemType, NewItem, Schedule,
    END_MILESTONE_ID, ROOT_ID, START_MILESTONE_ID,
};
pub use project::Project;
pub use record::{ItemRecord, ProjectRecord};

impl From<ScheduleError> for PyErr {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::ItemNotFound(_) => PyKeyError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

/// A scheduled project (PyO3 wrapper).
#[pyclass(name = "Project")]
pub struct PyProject {
    inner: Project,
}

#[pymethods]
impl PyProject {
    #[new]
    #[pyo3(signature = (id, title, start_date, config=None))]
    fn new(id: i64, title: String, start_date: NaiveDate, config: Option<EngineConfig>) -> Self {
        Self {
            inner: Project::with_config(id, title, start_date, config.unwrap_or_default()),
        }
    }

    /// Load a project from its JSON record.
    ///
    /// # Raises
    /// * ValueError if the record is malformed or its dependencies are cyclic
    #[staticmethod]
    #[pyo3(signature = (json, config=None))]
    fn from_json(json: &str, config: Option<EngineConfig>) -> PyResult<Self> {
        Ok(Self {
            inner: Project::from_json(json, config.unwrap_or_default())?,
        })
    }

    fn to_json(&self) -> PyResult<String> {
        Ok(self.inner.to_json()?)
    }

    /// Insert a `task`, `milestone` or `process` under `parent_id`.
    #[pyo3(signature = (parent_id, id, item_type, name, duration=None, cost=None, predecessors=None))]
    #[allow(clippy::too_many_arguments)]
    fn add_item(
        &mut self,
        parent_id: ItemId,
        id: ItemId,
        item_type: &str,
        name: String,
        duration: Option<u32>,
        cost: Option<f64>,
        predecessors: Option<Vec<ItemId>>,
    ) -> PyResult<()> {
        let mut item = match item_type.parse::<ItemType>()? {
            ItemType::Task => {
                let duration = duration.ok_or_else(|| {
                    PyValueError::new_err(format!("task {} needs a duration", id))
                })?;
                NewItem::task(id, name, duration)
            }
            ItemType::Milestone => NewItem::milestone(id, name),
            ItemType::Container => NewItem::container(id, name),
        };
        item.cost = cost;
        item.predecessors = predecessors.unwrap_or_default();
        Ok(self.inner.add_item(parent_id, item)?)
    }

    /// Partial update; arguments left as `None` keep their value.
    ///
    /// `clear` names optional fields to reset: `detail`, `cost`,
    /// `manual_duration` or `actual_start_date`.
    ///
    /// # Raises
    /// * ValueError for a type or parent change, a field the item does not
    ///   have, or a predecessor set that would create a cycle
    #[pyo3(signature = (
        id,
        name=None,
        detail=None,
        cost=None,
        manual_cost=None,
        item_type=None,
        parent_id=None,
        duration=None,
        manual_duration=None,
        actual_start_date=None,
        predecessors=None,
        clear=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn edit_item(
        &mut self,
        id: ItemId,
        name: Option<String>,
        detail: Option<String>,
        cost: Option<f64>,
        manual_cost: Option<bool>,
        item_type: Option<&str>,
        parent_id: Option<ItemId>,
        duration: Option<u32>,
        manual_duration: Option<u32>,
        actual_start_date: Option<NaiveDate>,
        predecessors: Option<Vec<ItemId>>,
        clear: Option<Vec<String>>,
    ) -> PyResult<()> {
        let mut edit = ItemEdit {
            name,
            detail: detail.map(Some),
            cost: cost.map(Some),
            manual_cost,
            item_type: item_type.map(str::parse::<ItemType>).transpose()?,
            parent: parent_id,
            duration,
            manual_duration: manual_duration.map(Some),
            actual_start: actual_start_date.map(Some),
            predecessors,
        };
        for field in clear.unwrap_or_default() {
            clear_field(&mut edit, &field)?;
        }
        Ok(self.inner.edit_item(id, edit)?)
    }

    fn delete_item(&mut self, id: ItemId) -> PyResult<()> {
        Ok(self.inner.delete_item(id)?)
    }

    /// # Raises
    /// * ValueError if the relation would create a cycle
    fn add_relation(&mut self, predecessor: ItemId, successor: ItemId) -> PyResult<()> {
        Ok(self.inner.add_relation(predecessor, successor)?)
    }

    fn remove_relation(&mut self, predecessor: ItemId, successor: ItemId) -> PyResult<()> {
        Ok(self.inner.remove_relation(predecessor, successor)?)
    }

    #[pyo3(signature = (id, date=None))]
    fn set_actual_start_date(&mut self, id: ItemId, date: Option<NaiveDate>) -> PyResult<()> {
        Ok(self.inner.set_actual_start_date(id, date)?)
    }

    fn start_date(&self, id: ItemId) -> PyResult<Option<NaiveDate>> {
        Ok(self.inner.item_start_date(id)?)
    }

    fn end_date(&self, id: ItemId) -> PyResult<Option<NaiveDate>> {
        Ok(self.inner.item_end_date(id)?)
    }

    fn total_cost(&self, id: ItemId) -> PyResult<f64> {
        Ok(self.inner.total_cost(id)?)
    }

    #[pyo3(signature = (id, method="uniform"))]
    fn cost_per_day(&self, id: ItemId, method: &str) -> PyResult<BTreeMap<NaiveDate, f64>> {
        Ok(self.inner.cost_per_day(id, method)?)
    }

    fn delay_days(&self, id: ItemId) -> PyResult<i64> {
        Ok(self.inner.delay_days(id)?)
    }

    /// # Raises
    /// * KeyError if no item has this id
    fn get_item(&self, id: ItemId) -> PyResult<PyItem> {
        let item = self.inner.get_item(id)?;
        Ok(PyItem::view(&self.inner, item, depth_of(&self.inner, item)))
    }

    /// Every item under the root in display order; `depth` is 0 at root level.
    fn flatten(&self) -> Vec<PyItem> {
        self.inner
            .flatten()
            .into_iter()
            .map(|(depth, item)| PyItem::view(&self.inner, item, depth))
            .collect()
    }

    /// Items on a critical path of the last recompute, in display order.
    fn critical_items(&self) -> Vec<PyItem> {
        self.inner
            .critical_items()
            .into_iter()
            .map(|item| PyItem::view(&self.inner, item, depth_of(&self.inner, item)))
            .collect()
    }

    /// Critical paths as `(item ids, total delay in days)` pairs.
    fn critical_paths(&self) -> Vec<(Vec<ItemId>, i64)> {
        self.inner
            .critical_paths()
            .iter()
            .map(|p| (p.path.clone(), p.total_delay_days))
            .collect()
    }

    fn total_delay_days(&self) -> i64 {
        self.inner.total_delay_days()
    }

    fn project_end_date(&self) -> Option<NaiveDate> {
        self.inner.end_date()
    }

    fn __repr__(&self) -> String {
        format!(
            "Project(id={}, title={:?}, items={}, critical_paths={})",
            self.inner.id(),
            self.inner.title(),
            self.inner.flatten().len(),
            self.inner.critical_paths().len()
        )
    }
}

/// Read-only snapshot of an item with its computed values (PyO3 wrapper).
#[pyclass(name = "Item")]
#[derive(Clone, Debug, PartialEq)]
pub struct PyItem {
    #[pyo3(get)]
    pub id: ItemId,
    #[pyo3(get)]
    pub name: String,
    /// `task`, `milestone` or `process`.
    #[pyo3(get)]
    pub item_type: String,
    #[pyo3(get)]
    pub detail: Option<String>,
    #[pyo3(get)]
    pub cost: Option<f64>,
    #[pyo3(get)]
    pub total_cost: f64,
    #[pyo3(get)]
    pub parent_id: Option<ItemId>,
    #[pyo3(get)]
    pub predecessors: Vec<ItemId>,
    /// Effective duration in days, tasks only.
    #[pyo3(get)]
    pub duration: Option<u32>,
    #[pyo3(get)]
    pub start_date: Option<NaiveDate>,
    #[pyo3(get)]
    pub end_date: Option<NaiveDate>,
    #[pyo3(get)]
    pub actual_start_date: Option<NaiveDate>,
    #[pyo3(get)]
    pub delay_days: i64,
    #[pyo3(get)]
    pub is_critical: bool,
    #[pyo3(get)]
    pub depth: usize,
}

impl PyItem {
    fn view(project: &Project, item: &Item, depth: usize) -> Self {
        let items = project.items();
        Self {
            id: item.id,
            name: item.name.clone(),
            item_type: item.item_type().to_string(),
            detail: item.detail.clone(),
            cost: item.cost,
            total_cost: aggregate::total_cost(items, item.id),
            parent_id: item.parent,
            predecessors: item.predecessors.clone(),
            duration: matches!(item.kind, ItemKind::Task { .. })
                .then(|| item.kind.duration_days()),
            start_date: aggregate::start_date(items, item.id),
            end_date: aggregate::end_date(items, item.id),
            actual_start_date: item.kind.schedule().and_then(|s| s.actual_start),
            delay_days: item.delay_days(),
            is_critical: item.critical,
            depth,
        }
    }
}

#[pymethods]
impl PyItem {
    fn __repr__(&self) -> String {
        format!(
            "Item(id={}, type={}, name={:?}, start={:?}, end={:?}, critical={})",
            self.id, self.item_type, self.name, self.start_date, self.end_date, self.is_critical
        )
    }
}

/// Nesting depth below the root container (root-level items are 0).
fn depth_of(project: &Project, item: &Item) -> usize {
    let mut depth = 0;
    let mut parent = item.parent;
    while let Some(id) = parent.filter(|&id| id != ROOT_ID) {
        depth += 1;
        parent = project.get_item(id).ok().and_then(|p| p.parent);
    }
    depth
}

/// Reset one optional field of an edit to "unset".
fn clear_field(edit: &mut ItemEdit, field: &str) -> Result<(), ScheduleError> {
    match field {
        "detail" => edit.detail = Some(None),
        "cost" => edit.cost = Some(None),
        "manual_duration" => edit.manual_duration = Some(None),
        "actual_start_date" => edit.actual_start = Some(None),
        other => {
            return Err(ScheduleError::InvalidOperation(format!(
                "field {} cannot be cleared",
                other
            )))
        }
    }
    Ok(())
}

/// The cpm.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyProject>()?;
    m.add_class::<PyItem>()?;
    m.add_class::<EngineConfig>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// root: a(1, 3 days), group(10){ b(2, 2 days, after a) }
    fn make_project() -> PyProject {
        let mut project = PyProject::new(1, "py".to_string(), d(2024, 1, 1), None);
        project
            .add_item(ROOT_ID, 1, "task", "a".to_string(), Some(3), Some(30.0), None)
            .unwrap();
        project
            .add_item(ROOT_ID, 10, "process", "group".to_string(), None, None, None)
            .unwrap();
        project
            .add_item(10, 2, "task", "b".to_string(), Some(2), Some(20.0), Some(vec![1]))
            .unwrap();
        project
    }

    fn edit(
        project: &mut PyProject,
        id: ItemId,
        name: Option<&str>,
        duration: Option<u32>,
        actual: Option<NaiveDate>,
        clear: Option<Vec<&str>>,
    ) -> PyResult<()> {
        project.edit_item(
            id,
            name.map(str::to_string),
            None,
            None,
            None,
            None,
            None,
            duration,
            None,
            actual,
            None,
            clear.map(|fields| fields.into_iter().map(str::to_string).collect()),
        )
    }

    #[test]
    fn test_item_view_carries_computed_values() {
        let project = make_project();
        let b = project.get_item(2).unwrap();
        assert_eq!(b.item_type, "task");
        assert_eq!(b.parent_id, Some(10));
        assert_eq!(b.depth, 1);
        assert_eq!(b.predecessors, vec![1]);
        assert_eq!(b.duration, Some(2));
        assert_eq!(b.start_date, Some(d(2024, 1, 4)));
        assert_eq!(b.end_date, Some(d(2024, 1, 6)));
        assert!(b.is_critical);

        let group = project.get_item(10).unwrap();
        assert_eq!(group.item_type, "process");
        assert_eq!(group.duration, None);
        assert_eq!(group.total_cost, 20.0);
        assert_eq!(group.depth, 0);
    }

    #[test]
    fn test_flatten_and_critical_items() {
        let project = make_project();
        let flat: Vec<(ItemId, usize)> =
            project.flatten().into_iter().map(|i| (i.id, i.depth)).collect();
        assert_eq!(flat, vec![(1, 0), (10, 0), (2, 1)]);

        let critical: Vec<ItemId> = project.critical_items().into_iter().map(|i| i.id).collect();
        assert_eq!(critical, vec![1, 2]);
    }

    #[test]
    fn test_edit_item_updates_and_recomputes() {
        let mut project = make_project();
        edit(&mut project, 1, Some("design"), Some(5), None, None).unwrap();
        assert_eq!(project.get_item(1).unwrap().name, "design");
        assert_eq!(project.get_item(2).unwrap().start_date, Some(d(2024, 1, 6)));
    }

    #[test]
    fn test_edit_item_clears_actual_start() {
        let mut project = make_project();
        edit(&mut project, 1, None, None, Some(d(2024, 1, 3)), None).unwrap();
        assert_eq!(project.get_item(1).unwrap().delay_days, 2);

        edit(&mut project, 1, None, None, None, Some(vec!["actual_start_date"])).unwrap();
        let a = project.get_item(1).unwrap();
        assert_eq!(a.actual_start_date, None);
        assert_eq!(a.delay_days, 0);
    }

    #[test]
    fn test_edit_item_rejections() {
        let mut project = make_project();
        assert!(edit(&mut project, 10, None, Some(2), None, None).is_err());
        assert!(edit(&mut project, 1, None, None, None, Some(vec!["name"])).is_err());
        assert!(project.get_item(99).is_err());
        assert_eq!(project.get_item(1).unwrap().duration, Some(3));
    }

    #[test]
    fn test_clear_field_names() {
        let mut item_edit = ItemEdit::default();
        clear_field(&mut item_edit, "cost").unwrap();
        clear_field(&mut item_edit, "manual_duration").unwrap();
        assert_eq!(item_edit.cost, Some(None));
        assert_eq!(item_edit.manual_duration, Some(None));
        assert!(matches!(
            clear_field(&mut item_edit, "parent"),
            Err(ScheduleError::InvalidOperation(_))
        ));
    }
}
