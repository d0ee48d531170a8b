//! Read-time aggregation of dates, costs and delays.
//!
//! Container values are never stored: every query walks the live children.
//! All functions pattern-match on `ItemKind`, so adding a variant is a
//! compile error until every query handles it.

use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ScheduleError;
use crate::models::{ItemId, ItemKind, ItemMap};

/// Displayed start date. Containers take the earliest child start and are
/// undefined when no child has a date.
pub fn start_date(items: &ItemMap, id: ItemId) -> Option<NaiveDate> {
    let item = items.get(&id)?;
    match &item.kind {
        ItemKind::Task { schedule, .. } | ItemKind::Milestone { schedule } => schedule.start(),
        ItemKind::Container { children, .. } => children
            .iter()
            .filter_map(|&child| start_date(items, child))
            .min(),
    }
}

/// Displayed end date: start plus duration for tasks, the start itself for
/// milestones, the latest child end for containers.
pub fn end_date(items: &ItemMap, id: ItemId) -> Option<NaiveDate> {
    let item = items.get(&id)?;
    match &item.kind {
        ItemKind::Task { schedule, .. } => schedule
            .start()
            .and_then(|start| start.checked_add_days(Days::new(item.kind.duration_days().into()))),
        ItemKind::Milestone { schedule } => schedule.start(),
        ItemKind::Container { children, .. } => children
            .iter()
            .filter_map(|&child| end_date(items, child))
            .max(),
    }
}

/// Total cost: own cost for terminals and manual-cost containers, the sum
/// of children's totals otherwise.
pub fn total_cost(items: &ItemMap, id: ItemId) -> f64 {
    let Some(item) = items.get(&id) else {
        return 0.0;
    };
    match &item.kind {
        ItemKind::Task { .. } | ItemKind::Milestone { .. } => item.cost.unwrap_or(0.0),
        ItemKind::Container {
            manual_cost: true, ..
        } => item.cost.unwrap_or(0.0),
        ItemKind::Container { children, .. } => children
            .iter()
            .map(|&child| total_cost(items, child))
            .sum(),
    }
}

/// How an item's cost is spread across the days it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostDistribution {
    /// Equal share on every day of the span.
    Uniform,
    /// Whole cost on the first day.
    FrontLoaded,
    /// Whole cost on the last day.
    BackLoaded,
}

impl FromStr for CostDistribution {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "front_loaded" => Ok(Self::FrontLoaded),
            "back_loaded" => Ok(Self::BackLoaded),
            other => Err(ScheduleError::invalid(format!(
                "unknown cost distribution method: {}",
                other
            ))),
        }
    }
}

/// Per-day cost breakdown of an item, keyed by date.
///
/// Tasks spread over their duration, milestones book on their date,
/// manual-cost containers spread over their own span and other containers
/// merge their children's breakdowns. Undated items contribute nothing.
pub fn daily_costs(
    items: &ItemMap,
    id: ItemId,
    method: CostDistribution,
) -> BTreeMap<NaiveDate, f64> {
    let mut out = BTreeMap::new();
    collect_daily_costs(items, id, method, &mut out);
    out
}

fn collect_daily_costs(
    items: &ItemMap,
    id: ItemId,
    method: CostDistribution,
    out: &mut BTreeMap<NaiveDate, f64>,
) {
    let Some(item) = items.get(&id) else {
        return;
    };
    match &item.kind {
        ItemKind::Task { .. } | ItemKind::Milestone { .. } => {
            if let Some(start) = start_date(items, id) {
                let cost = item.cost.unwrap_or(0.0);
                spread(start, item.kind.duration_days().into(), cost, method, out);
            }
        }
        ItemKind::Container {
            manual_cost: true, ..
        } => {
            if let (Some(start), Some(end)) = (start_date(items, id), end_date(items, id)) {
                let days = (end - start).num_days().max(0) as u64;
                spread(start, days, item.cost.unwrap_or(0.0), method, out);
            }
        }
        ItemKind::Container { children, .. } => {
            for &child in children {
                collect_daily_costs(items, child, method, out);
            }
        }
    }
}

fn spread(
    start: NaiveDate,
    days: u64,
    cost: f64,
    method: CostDistribution,
    out: &mut BTreeMap<NaiveDate, f64>,
) {
    if cost == 0.0 {
        return;
    }
    // Zero-length spans book everything on the start day.
    if days == 0 {
        *out.entry(start).or_insert(0.0) += cost;
        return;
    }
    match method {
        CostDistribution::Uniform => {
            let share = cost / days as f64;
            for offset in 0..days {
                if let Some(day) = start.checked_add_days(Days::new(offset)) {
                    *out.entry(day).or_insert(0.0) += share;
                }
            }
        }
        CostDistribution::FrontLoaded => {
            *out.entry(start).or_insert(0.0) += cost;
        }
        CostDistribution::BackLoaded => {
            let last = start.checked_add_days(Days::new(days - 1)).unwrap_or(start);
            *out.entry(last).or_insert(0.0) += cost;
        }
    }
}
