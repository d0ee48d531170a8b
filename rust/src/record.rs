//! JSON project records.
//!
//! A record is the serialized form of a project: containers may carry their
//! children inline (`children`) or children may point at their container
//! (`parentId`); both forms can be mixed. Dates use `dd-mm-yyyy`. The
//! `data` block holds computed values and is written but never read.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate;
use crate::config::EngineConfig;
use crate::error::ScheduleError;
use crate::models::{
    is_reserved_id, CriticalPath, Item, ItemId, ItemKind, ItemType, NewItem, Schedule, ROOT_ID,
};
use crate::project::Project;

/// Date format used in records.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

mod day {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod optional_day {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(with = "day")]
    pub start_date: NaiveDate,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    /// Written from the last recompute; recomputed on load.
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub critical_paths: Vec<CriticalPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: ItemId,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub manual_cost: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predecessor_ids: Vec<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_duration: Option<u32>,
    #[serde(
        default,
        with = "optional_day",
        skip_serializing_if = "Option::is_none"
    )]
    pub actual_start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ItemRecord>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub data: Option<ItemData>,
}

/// Computed values of an item at serialization time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    #[serde(serialize_with = "optional_day::serialize")]
    pub start_date: Option<NaiveDate>,
    #[serde(serialize_with = "optional_day::serialize")]
    pub end_date: Option<NaiveDate>,
    pub cost: f64,
    pub is_critical: bool,
}

/// Flatten nested and parent-referencing records into `(parent, record)`
/// pairs, parents before their inline children.
fn flatten_records(
    records: Vec<ItemRecord>,
    parent: Option<ItemId>,
    out: &mut Vec<(ItemId, ItemRecord)>,
) -> Result<(), ScheduleError> {
    for mut record in records {
        let parent_id = match (parent, record.parent_id) {
            (Some(outer), Some(declared)) if outer != declared => {
                return Err(ScheduleError::validation(format!(
                    "item {} is nested under {} but declares parent {}",
                    record.id, outer, declared
                )));
            }
            (Some(outer), _) => outer,
            (None, Some(declared)) => declared,
            (None, None) => ROOT_ID,
        };
        let children = record.children.take().unwrap_or_default();
        if !children.is_empty() && record.item_type != ItemType::Container {
            return Err(ScheduleError::validation(format!(
                "{} {} cannot have children",
                record.item_type, record.id
            )));
        }
        let id = record.id;
        out.push((parent_id, record));
        flatten_records(children, Some(id), out)?;
    }
    Ok(())
}

/// Convert one record into an insertable item plus its predecessor ids.
fn new_item(record: ItemRecord) -> Result<(NewItem, Vec<ItemId>), ScheduleError> {
    let id = record.id;
    if record.manual_cost && record.item_type != ItemType::Container {
        return Err(ScheduleError::validation(format!(
            "{} {} cannot use a manual cost",
            record.item_type, id
        )));
    }
    if record.item_type != ItemType::Task
        && (record.duration.is_some() || record.manual_duration.is_some())
    {
        return Err(ScheduleError::validation(format!(
            "{} {} cannot have a duration",
            record.item_type, id
        )));
    }
    let schedule = Schedule {
        calculated_start: None,
        actual_start: record.actual_start_date,
    };

    let kind = match record.item_type {
        ItemType::Task => ItemKind::Task {
            schedule,
            duration: record.duration.ok_or_else(|| {
                ScheduleError::validation(format!("task {} has no duration", id))
            })?,
            manual_duration: record.manual_duration,
        },
        ItemType::Milestone => ItemKind::Milestone { schedule },
        ItemType::Container => {
            if record.actual_start_date.is_some() {
                return Err(ScheduleError::validation(format!(
                    "process {} cannot have an actual start date",
                    id
                )));
            }
            ItemKind::Container {
                children: Vec::new(),
                manual_cost: record.manual_cost,
            }
        }
    };

    let mut item = NewItem::new(id, record.name, kind);
    item.detail = record.detail;
    item.cost = record.cost;
    Ok((item, record.predecessor_ids))
}

impl Project {
    /// Build a project from its record.
    ///
    /// Items are inserted once their container exists, so records may appear
    /// in any order. Relations are validated after the whole tree is in
    /// place; the first invalid one fails the load.
    pub fn from_record(record: ProjectRecord, config: EngineConfig) -> Result<Self, ScheduleError> {
        let mut project = Project::with_config(record.id, record.title, record.start_date, config);
        project.set_subtitle(record.subtitle);

        let mut flat = Vec::new();
        flatten_records(record.items, None, &mut flat)?;

        let mut pending = Vec::with_capacity(flat.len());
        for (parent, item_record) in flat {
            let (item, predecessors) = new_item(item_record)?;
            pending.push((parent, item, predecessors));
        }

        let mut relations: Vec<(ItemId, Vec<ItemId>)> = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for (parent, item, predecessors) in pending {
                if project.items().contains_key(&parent) {
                    relations.push((item.id, predecessors));
                    project
                        .insert_item(parent, item)
                        .map_err(|err| match err {
                            ScheduleError::InvalidOperation(msg) => ScheduleError::Validation(msg),
                            other => other,
                        })?;
                } else {
                    deferred.push((parent, item, predecessors));
                }
            }
            if deferred.len() == before {
                let (parent, item, _) = &deferred[0];
                return Err(ScheduleError::validation(format!(
                    "item {} references unknown parent {}",
                    item.id, parent
                )));
            }
            pending = deferred;
        }

        for (id, predecessors) in relations {
            for pred in predecessors {
                if is_reserved_id(pred) || !project.items().contains_key(&pred) {
                    return Err(ScheduleError::validation(format!(
                        "item {} references unknown predecessor {}",
                        id, pred
                    )));
                }
                project.link(pred, id)?;
            }
        }

        project.recompute();
        Ok(project)
    }

    /// Serialize into the nested record form, computed values included.
    pub fn to_record(&self) -> ProjectRecord {
        let roots = self
            .get_item(ROOT_ID)
            .map(|root| root.kind.children().to_vec())
            .unwrap_or_default();
        ProjectRecord {
            id: self.id(),
            title: self.title().to_string(),
            subtitle: self.subtitle().map(str::to_string),
            start_date: self.start_date(),
            items: roots
                .into_iter()
                .filter_map(|id| self.get_item(id).ok())
                .map(|item| self.item_record(item))
                .collect(),
            critical_paths: self.critical_paths().to_vec(),
        }
    }

    fn item_record(&self, item: &Item) -> ItemRecord {
        let (duration, manual_duration) = match &item.kind {
            ItemKind::Task {
                duration,
                manual_duration,
                ..
            } => (Some(*duration), *manual_duration),
            _ => (None, None),
        };
        let (manual_cost, children) = match &item.kind {
            ItemKind::Container {
                children,
                manual_cost,
            } => (
                *manual_cost,
                Some(
                    children
                        .iter()
                        .filter_map(|id| self.get_item(*id).ok())
                        .map(|child| self.item_record(child))
                        .collect(),
                ),
            ),
            _ => (false, None),
        };

        ItemRecord {
            id: item.id,
            item_type: item.item_type(),
            name: item.name.clone(),
            detail: item.detail.clone(),
            cost: item.cost,
            manual_cost,
            parent_id: item.parent,
            predecessor_ids: item.predecessors.clone(),
            duration,
            manual_duration,
            actual_start_date: item.kind.schedule().and_then(|s| s.actual_start),
            children,
            data: Some(ItemData {
                start_date: aggregate::start_date(self.items(), item.id),
                end_date: aggregate::end_date(self.items(), item.id),
                cost: aggregate::total_cost(self.items(), item.id),
                is_critical: item.critical,
            }),
        }
    }

    pub fn from_json(json: &str, config: EngineConfig) -> Result<Self, ScheduleError> {
        let record: ProjectRecord = serde_json::from_str(json)
            .map_err(|e| ScheduleError::validation(e.to_string()))?;
        Self::from_record(record, config)
    }

    pub fn to_json(&self) -> Result<String, ScheduleError> {
        serde_json::to_string_pretty(&self.to_record())
            .map_err(|e| ScheduleError::validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn load(json: &str) -> Result<Project, ScheduleError> {
        Project::from_json(json, EngineConfig::default())
    }

    const NESTED: &str = r#"{
        "id": 7,
        "title": "Release",
        "subtitle": "Q1",
        "startDate": "01-01-2024",
        "items": [
            { "id": 1, "type": "task", "name": "Design", "duration": 3, "cost": 300 },
            {
                "id": 10, "type": "process", "name": "Build",
                "predecessorIds": [1],
                "children": [
                    { "id": 2, "type": "task", "name": "Backend", "duration": 2, "cost": 200 },
                    { "id": 3, "type": "task", "name": "Frontend", "duration": 2, "cost": 100 }
                ]
            },
            { "id": 4, "type": "milestone", "name": "Ship", "predecessorIds": [10] }
        ]
    }"#;

    #[test]
    fn test_load_nested_record() {
        let project = load(NESTED).unwrap();
        assert_eq!(project.title(), "Release");
        assert_eq!(project.subtitle(), Some("Q1"));
        assert_eq!(project.item_start_date(2).unwrap(), Some(d(2024, 1, 4)));
        assert_eq!(project.item_start_date(3).unwrap(), Some(d(2024, 1, 4)));
        assert_eq!(project.item_start_date(4).unwrap(), Some(d(2024, 1, 6)));
        assert_eq!(project.item_end_date(10).unwrap(), Some(d(2024, 1, 6)));
        assert_eq!(project.total_cost(ROOT_ID).unwrap(), 600.0);
        assert_eq!(project.critical_paths().len(), 2);
    }

    #[test]
    fn test_load_flat_record_in_any_order() {
        let json = r#"{
            "id": 1, "title": "flat", "startDate": "10-03-2024",
            "items": [
                { "id": 2, "type": "task", "name": "child", "duration": 1, "parentId": 10 },
                { "id": 10, "type": "process", "name": "group" },
                { "id": 3, "type": "task", "name": "after", "duration": 1, "predecessorIds": [2] }
            ]
        }"#;
        let project = load(json).unwrap();
        assert_eq!(project.get_item(2).unwrap().parent, Some(10));
        assert_eq!(project.item_start_date(3).unwrap(), Some(d(2024, 3, 11)));
    }

    #[test]
    fn test_actual_start_date_is_read() {
        let json = r#"{
            "id": 1, "title": "late", "startDate": "01-01-2024",
            "items": [
                { "id": 1, "type": "task", "name": "a", "duration": 1, "actualStartDate": "03-01-2024" },
                { "id": 2, "type": "task", "name": "b", "duration": 1, "predecessorIds": [1] }
            ]
        }"#;
        let project = load(json).unwrap();
        assert_eq!(project.delay_days(1).unwrap(), 2);
        assert_eq!(project.item_start_date(2).unwrap(), Some(d(2024, 1, 4)));
    }

    #[test]
    fn test_task_without_duration_is_rejected() {
        let json = r#"{ "id": 1, "title": "t", "startDate": "01-01-2024",
            "items": [ { "id": 1, "type": "task", "name": "a" } ] }"#;
        assert!(matches!(load(json), Err(ScheduleError::Validation(_))));
    }

    #[test]
    fn test_unknown_references_are_rejected() {
        let parent = r#"{ "id": 1, "title": "t", "startDate": "01-01-2024",
            "items": [ { "id": 1, "type": "task", "name": "a", "duration": 1, "parentId": 42 } ] }"#;
        assert!(matches!(load(parent), Err(ScheduleError::Validation(_))));

        let pred = r#"{ "id": 1, "title": "t", "startDate": "01-01-2024",
            "items": [ { "id": 1, "type": "task", "name": "a", "duration": 1, "predecessorIds": [42] } ] }"#;
        assert!(matches!(load(pred), Err(ScheduleError::Validation(_))));
    }

    #[test]
    fn test_task_parent_is_rejected() {
        let json = r#"{ "id": 1, "title": "t", "startDate": "01-01-2024",
            "items": [
                { "id": 1, "type": "task", "name": "a", "duration": 1 },
                { "id": 2, "type": "task", "name": "b", "duration": 1, "parentId": 1 }
            ] }"#;
        assert!(matches!(load(json), Err(ScheduleError::Validation(_))));
    }

    #[test]
    fn test_conflicting_parent_is_rejected() {
        let json = r#"{ "id": 1, "title": "t", "startDate": "01-01-2024",
            "items": [
                { "id": 10, "type": "process", "name": "g", "children": [
                    { "id": 1, "type": "task", "name": "a", "duration": 1, "parentId": 11 }
                ] }
            ] }"#;
        assert!(matches!(load(json), Err(ScheduleError::Validation(_))));
    }

    #[test]
    fn test_cyclic_record_is_rejected() {
        let json = r#"{ "id": 1, "title": "t", "startDate": "01-01-2024",
            "items": [
                { "id": 1, "type": "task", "name": "a", "duration": 1, "predecessorIds": [2] },
                { "id": 2, "type": "task", "name": "b", "duration": 1, "predecessorIds": [1] }
            ] }"#;
        assert!(matches!(load(json), Err(ScheduleError::CycleDetected(_))));
    }

    #[test]
    fn test_bad_date_format_is_rejected() {
        let json = r#"{ "id": 1, "title": "t", "startDate": "2024-01-01", "items": [] }"#;
        assert!(matches!(load(json), Err(ScheduleError::Validation(_))));
    }

    #[test]
    fn test_written_record_carries_computed_data() {
        let project = load(NESTED).unwrap();
        let value: serde_json::Value = serde_json::from_str(&project.to_json().unwrap()).unwrap();

        assert_eq!(value["startDate"], "01-01-2024");
        let build = &value["items"][1];
        assert_eq!(build["type"], "process");
        assert_eq!(build["data"]["startDate"], "04-01-2024");
        assert_eq!(build["data"]["endDate"], "06-01-2024");
        assert_eq!(build["data"]["cost"], 300.0);
        assert_eq!(build["children"][0]["data"]["isCritical"], true);
        assert!(build.get("manualCost").is_none());
    }

    type Summary = (ItemId, Option<ItemId>, Vec<ItemId>, Option<f64>);

    /// `(id, parentId, predecessorIds, cost)` of every record, nested ones included.
    fn summarize(records: &[ItemRecord], out: &mut Vec<Summary>) {
        for record in records {
            out.push((
                record.id,
                record.parent_id,
                record.predecessor_ids.clone(),
                record.cost,
            ));
            if let Some(children) = &record.children {
                summarize(children, out);
            }
        }
    }

    #[test]
    fn test_flat_record_survives_a_write() {
        let json = r#"{
            "id": 1, "title": "flat", "startDate": "01-01-2024",
            "items": [
                { "id": 10, "type": "process", "name": "group", "parentId": 0 },
                { "id": 2, "type": "task", "name": "child", "duration": 1, "cost": 5, "parentId": 10 },
                { "id": 3, "type": "task", "name": "after", "duration": 2, "cost": 7,
                  "parentId": 0, "predecessorIds": [2] }
            ]
        }"#;
        let input: ProjectRecord = serde_json::from_str(json).unwrap();
        let written: ProjectRecord =
            serde_json::from_str(&load(json).unwrap().to_json().unwrap()).unwrap();

        let mut expected = Vec::new();
        summarize(&input.items, &mut expected);
        let mut actual = Vec::new();
        summarize(&written.items, &mut actual);
        expected.sort_by_key(|entry| entry.0);
        actual.sort_by_key(|entry| entry.0);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_written_record_lists_critical_paths() {
        let project = load(NESTED).unwrap();
        let value: serde_json::Value = serde_json::from_str(&project.to_json().unwrap()).unwrap();
        let paths = value["criticalPaths"].as_array().unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0]["path"][0], 1);
        assert_eq!(paths[0]["totalDelayDays"], 0);
    }

    #[test]
    fn test_reserved_predecessor_is_rejected() {
        for reserved in [0, -1, -2] {
            let json = format!(
                r#"{{ "id": 1, "title": "t", "startDate": "01-01-2024",
                    "items": [ {{ "id": 1, "type": "task", "name": "a", "duration": 1,
                                  "predecessorIds": [{}] }} ] }}"#,
                reserved
            );
            assert!(matches!(load(&json), Err(ScheduleError::Validation(_))));
        }
    }

    #[test]
    fn test_written_record_loads_back() {
        let project = load(NESTED).unwrap();
        let reloaded = load(&project.to_json().unwrap()).unwrap();
        let shape = |p: &Project| -> Vec<(usize, ItemId, Option<f64>)> {
            p.flatten()
                .into_iter()
                .map(|(depth, item)| (depth, item.id, item.cost))
                .collect()
        };
        assert_eq!(shape(&reloaded), shape(&project));
        assert_eq!(reloaded.critical_paths(), project.critical_paths());
        assert_eq!(reloaded.end_date(), project.end_date());
        assert_eq!(
            reloaded.get_item(4).unwrap().predecessors,
            project.get_item(4).unwrap().predecessors
        );
    }
}
