//! Core data types for the item arena.
//!
//! Items reference each other by id only (`parent`, `children`,
//! `predecessors`), so the hierarchy and the dependency relation live in a
//! flat map owned by the `Project`.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Caller-assigned item identifier.
pub type ItemId = i64;

/// The flat item arena, keyed by id.
pub type ItemMap = FxHashMap<ItemId, Item>;

/// Id of the synthetic root container.
pub const ROOT_ID: ItemId = 0;
/// Id of the synthetic start milestone.
pub const START_MILESTONE_ID: ItemId = -1;
/// Id of the synthetic end milestone.
pub const END_MILESTONE_ID: ItemId = -2;

/// Whether an id belongs to one of the project's synthetic items.
pub fn is_reserved_id(id: ItemId) -> bool {
    id <= ROOT_ID
}

/// Declared type of an item, as it appears in project records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Task,
    Milestone,
    #[serde(rename = "process")]
    Container,
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Milestone => write!(f, "milestone"),
            Self::Container => write!(f, "process"),
        }
    }
}

impl std::str::FromStr for ItemType {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(Self::Task),
            "milestone" => Ok(Self::Milestone),
            "process" => Ok(Self::Container),
            other => Err(ScheduleError::invalid(format!("unknown item type: {}", other))),
        }
    }
}

/// Planned and actual start of a terminal item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Set by the forward pass.
    pub calculated_start: Option<NaiveDate>,
    /// Real-world override; wins over the calculated date when present.
    pub actual_start: Option<NaiveDate>,
}

impl Schedule {
    /// The displayed start date.
    pub fn start(&self) -> Option<NaiveDate> {
        self.actual_start.or(self.calculated_start)
    }

    /// Days between the actual and the calculated start (0 without an actual date).
    pub fn delay_days(&self) -> i64 {
        match (self.actual_start, self.calculated_start) {
            (Some(actual), Some(calculated)) => (actual - calculated).num_days(),
            _ => 0,
        }
    }
}

/// Variant-specific data of an item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Task {
        schedule: Schedule,
        /// Calculated duration in days.
        duration: u32,
        /// Manual override; wins over `duration` when present.
        manual_duration: Option<u32>,
    },
    Milestone {
        schedule: Schedule,
    },
    Container {
        /// Display order only.
        children: Vec<ItemId>,
        /// Report `Item::cost` instead of the children's sum.
        manual_cost: bool,
    },
}

impl ItemKind {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Task { .. } => ItemType::Task,
            Self::Milestone { .. } => ItemType::Milestone,
            Self::Container { .. } => ItemType::Container,
        }
    }

    /// Schedule of a terminal item, `None` for containers.
    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            Self::Task { schedule, .. } | Self::Milestone { schedule } => Some(schedule),
            Self::Container { .. } => None,
        }
    }

    pub fn schedule_mut(&mut self) -> Option<&mut Schedule> {
        match self {
            Self::Task { schedule, .. } | Self::Milestone { schedule } => Some(schedule),
            Self::Container { .. } => None,
        }
    }

    /// Effective duration in days: the manual override if set, floored at 1.
    /// Milestones and containers have none.
    pub fn duration_days(&self) -> u32 {
        match self {
            Self::Task {
                duration,
                manual_duration,
                ..
            } => manual_duration.unwrap_or(*duration).max(1),
            Self::Milestone { .. } | Self::Container { .. } => 0,
        }
    }

    pub fn children(&self) -> &[ItemId] {
        match self {
            Self::Container { children, .. } => children,
            Self::Task { .. } | Self::Milestone { .. } => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Container { .. })
    }
}

/// A node of the project tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub detail: Option<String>,
    /// Own cost; for containers only meaningful with `manual_cost`.
    pub cost: Option<f64>,
    /// Owning container, `None` for the root and the synthetic milestones.
    pub parent: Option<ItemId>,
    /// Declared predecessors, in declaration order.
    pub predecessors: Vec<ItemId>,
    /// Set when the item lies on a critical path of the last recompute.
    pub critical: bool,
    pub kind: ItemKind,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id,
            name: name.into(),
            detail: None,
            cost: None,
            parent: None,
            predecessors: Vec::new(),
            critical: false,
            kind,
        }
    }

    pub fn task(id: ItemId, name: impl Into<String>, duration: u32) -> Self {
        Self::new(
            id,
            name,
            ItemKind::Task {
                schedule: Schedule::default(),
                duration,
                manual_duration: None,
            },
        )
    }

    pub fn milestone(id: ItemId, name: impl Into<String>) -> Self {
        Self::new(
            id,
            name,
            ItemKind::Milestone {
                schedule: Schedule::default(),
            },
        )
    }

    pub fn container(id: ItemId, name: impl Into<String>) -> Self {
        Self::new(
            id,
            name,
            ItemKind::Container {
                children: Vec::new(),
                manual_cost: false,
            },
        )
    }

    pub fn item_type(&self) -> ItemType {
        self.kind.item_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Delay of a terminal item in days (0 for containers).
    pub fn delay_days(&self) -> i64 {
        self.kind.schedule().map(Schedule::delay_days).unwrap_or(0)
    }
}

/// Description of an item to insert under a container.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub id: ItemId,
    pub name: String,
    pub detail: Option<String>,
    pub cost: Option<f64>,
    pub kind: ItemKind,
    /// Predecessors to relate once the item is in the tree.
    pub predecessors: Vec<ItemId>,
}

impl NewItem {
    pub fn new(id: ItemId, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id,
            name: name.into(),
            detail: None,
            cost: None,
            kind,
            predecessors: Vec::new(),
        }
    }

    pub fn task(id: ItemId, name: impl Into<String>, duration: u32) -> Self {
        let item = Item::task(id, name, duration);
        Self::new(id, item.name, item.kind)
    }

    pub fn milestone(id: ItemId, name: impl Into<String>) -> Self {
        let item = Item::milestone(id, name);
        Self::new(id, item.name, item.kind)
    }

    pub fn container(id: ItemId, name: impl Into<String>) -> Self {
        let item = Item::container(id, name);
        Self::new(id, item.name, item.kind)
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_predecessors(mut self, predecessors: impl IntoIterator<Item = ItemId>) -> Self {
        self.predecessors = predecessors.into_iter().collect();
        self
    }
}

/// Partial update applied by `Project::edit_item`.
///
/// `None` leaves a field untouched. `item_type` and `parent` are accepted only
/// when they match the current values; changing them requires deleting and
/// recreating the item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemEdit {
    pub name: Option<String>,
    pub detail: Option<Option<String>>,
    pub cost: Option<Option<f64>>,
    pub manual_cost: Option<bool>,
    pub item_type: Option<ItemType>,
    pub parent: Option<ItemId>,
    pub duration: Option<u32>,
    pub manual_duration: Option<Option<u32>>,
    pub actual_start: Option<Option<NaiveDate>>,
    /// Replaces the whole declared predecessor set.
    pub predecessors: Option<Vec<ItemId>>,
}

/// A maximal zero-slack chain from the start milestone to the end milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalPath {
    /// Member items in order.
    pub path: Vec<ItemId>,
    /// Sum of the members' individual delays.
    pub total_delay_days: i64,
}
