use crate::types::{AggregateReport, NormalizedRow, StatusAggregate};
use std::collections::{BTreeMap, HashSet};

/// Statuses always shown in the pinned summary, in display order.
pub const DEFAULT_TARGET_STATUSES: [&str; 6] =
    ["Costed", "Released", "Completed", "Planned", "Free", "Blank"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOrder {
    /// Highest distinct-order count first; ties alphabetical.
    CountDesc,
    Alphabetical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(String),
}

impl StatusFilter {
    pub fn matches(&self, row: &NormalizedRow) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(status) => row.status == *status,
        }
    }
}

/// Group rows by status.
///
/// `count` is the number of distinct order ids in a group while `value` sums
/// every line item. The totals are taken over the whole set, so an order seen
/// under two statuses counts once in `total_count` but once in each group.
pub fn aggregate(rows: &[NormalizedRow]) -> AggregateReport {
    #[derive(Default)]
    struct Acc<'a> {
        ids: HashSet<&'a str>,
        value: f64,
    }

    let mut map: BTreeMap<&str, Acc> = BTreeMap::new();
    let mut all_ids: HashSet<&str> = HashSet::new();
    let mut total_value = 0.0;
    for r in rows {
        let e = map.entry(r.status.as_str()).or_default();
        e.ids.insert(r.order_id.as_str());
        e.value += r.amount;
        all_ids.insert(r.order_id.as_str());
        total_value += r.amount;
    }

    let groups = map
        .into_iter()
        .map(|(status, acc)| StatusAggregate {
            status: status.to_string(),
            count: acc.ids.len(),
            value: acc.value,
        })
        .collect();

    AggregateReport {
        groups,
        total_count: all_ids.len(),
        total_value,
    }
}

impl AggregateReport {
    pub fn get(&self, status: &str) -> Option<&StatusAggregate> {
        self.groups.iter().find(|g| g.status == status)
    }

    pub fn sorted(&self, order: StatusOrder) -> Vec<StatusAggregate> {
        let mut groups = self.groups.clone();
        match order {
            StatusOrder::Alphabetical => groups.sort_by(|a, b| a.status.cmp(&b.status)),
            StatusOrder::CountDesc => groups.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| a.status.cmp(&b.status))
            }),
        }
        groups
    }

    /// Exactly the `targets`, in their order; statuses absent from the data report zero.
    pub fn pinned<S: AsRef<str>>(&self, targets: &[S]) -> Vec<StatusAggregate> {
        targets
            .iter()
            .map(|t| {
                let t = t.as_ref();
                self.get(t).cloned().unwrap_or_else(|| StatusAggregate {
                    status: t.to_string(),
                    count: 0,
                    value: 0.0,
                })
            })
            .collect()
    }

    /// Every status present in the data, alphabetically.
    pub fn observed_statuses(&self) -> Vec<String> {
        self.sorted(StatusOrder::Alphabetical)
            .into_iter()
            .map(|g| g.status)
            .collect()
    }
}

pub fn filter_rows<'a>(rows: &'a [NormalizedRow], filter: &StatusFilter) -> Vec<&'a NormalizedRow> {
    rows.iter().filter(|r| filter.matches(r)).collect()
}

/// Distinct-order count and summed value of a selection.
pub fn view_metrics(rows: &[&NormalizedRow]) -> (usize, f64) {
    let ids: HashSet<&str> = rows.iter().map(|r| r.order_id.as_str()).collect();
    let value: f64 = rows.iter().map(|r| r.amount).sum();
    (ids.len(), value)
}
