// Column guessing for the order id, status and amount roles.
//
// Rules are plain data: for every role a priority tier is tried across all
// columns before the broader fallback tier, and the first column is used when
// nothing matches. The priority tier for status exists so "SO Status" wins over
// a "Quotation Status" column that a bare "status" match would pick first.
use crate::loader::UNNAMED_PREFIX;
use crate::types::{ColumnBinding, ColumnRole};
use std::fmt;
use tracing::warn;

/// Header names longer than this usually mean a title or note row was taken as the header.
pub const MAX_PLAUSIBLE_HEADER_LEN: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Priority,
    Fallback,
    FirstColumn,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchTier::Priority => "priority keyword",
            MatchTier::Fallback => "fallback keyword",
            MatchTier::FirstColumn => "first column (no match)",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverRule {
    pub role: ColumnRole,
    pub tier: MatchTier,
    pub keywords: &'static [&'static str],
}

pub const RESOLVER_RULES: &[ResolverRule] = &[
    ResolverRule {
        role: ColumnRole::OrderId,
        tier: MatchTier::Priority,
        keywords: &["serviceorder", "service order", "service_order"],
    },
    ResolverRule {
        role: ColumnRole::OrderId,
        tier: MatchTier::Fallback,
        keywords: &["order"],
    },
    ResolverRule {
        role: ColumnRole::Status,
        tier: MatchTier::Priority,
        keywords: &["sostatus", "so status", "so_status"],
    },
    ResolverRule {
        role: ColumnRole::Status,
        tier: MatchTier::Fallback,
        keywords: &["status"],
    },
    ResolverRule {
        role: ColumnRole::Amount,
        tier: MatchTier::Priority,
        keywords: &["totalsales", "total sales", "total_sales"],
    },
    ResolverRule {
        role: ColumnRole::Amount,
        tier: MatchTier::Fallback,
        keywords: &["sales", "amount", "total"],
    },
];

/// A default binding plus how each role was matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub binding: ColumnBinding,
    pub order_id: MatchTier,
    pub status: MatchTier,
    pub amount: MatchTier,
}

impl Resolution {
    pub fn tier(&self, role: ColumnRole) -> MatchTier {
        match role {
            ColumnRole::OrderId => self.order_id,
            ColumnRole::Status => self.status,
            ColumnRole::Amount => self.amount,
        }
    }

    /// Roles that fell back to the first column.
    pub fn unmatched_roles(&self) -> Vec<ColumnRole> {
        ColumnRole::ALL
            .into_iter()
            .filter(|role| self.tier(*role) == MatchTier::FirstColumn)
            .collect()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Pick a column for `role` from `columns`, walking the rule table in order.
pub fn resolve_role(columns: &[String], role: ColumnRole) -> (String, MatchTier) {
    let normalized: Vec<String> = columns.iter().map(|c| normalize_name(c)).collect();
    for rule in RESOLVER_RULES.iter().filter(|r| r.role == role) {
        let hit = normalized
            .iter()
            .position(|name| rule.keywords.iter().any(|k| name.contains(k)));
        if let Some(idx) = hit {
            return (columns[idx].clone(), rule.tier);
        }
    }
    // An empty header list leaves the name empty; binding validation rejects it later.
    let first = columns.first().cloned().unwrap_or_default();
    (first, MatchTier::FirstColumn)
}

/// Default binding for a table with the given header names. Never fails.
pub fn resolve(columns: &[String]) -> Resolution {
    let (order_id, order_tier) = resolve_role(columns, ColumnRole::OrderId);
    let (status, status_tier) = resolve_role(columns, ColumnRole::Status);
    let (amount, amount_tier) = resolve_role(columns, ColumnRole::Amount);
    let resolution = Resolution {
        binding: ColumnBinding {
            order_id,
            status,
            amount,
        },
        order_id: order_tier,
        status: status_tier,
        amount: amount_tier,
    };
    for role in resolution.unmatched_roles() {
        warn!(
            %role,
            column = %resolution.binding.get(role),
            "no keyword matched; defaulting to the first column"
        );
    }
    resolution
}

/// Non-fatal signs that the header row setting is wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderWarning {
    Placeholder { column: String },
    TooLong { column: String, len: usize },
}

impl fmt::Display for HeaderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderWarning::Placeholder { column } => write!(
                f,
                "column {column:?} has no header; the header row setting is probably wrong"
            ),
            HeaderWarning::TooLong { column, len } => write!(
                f,
                "column header is {len} characters long ({:?}...); the header row setting is probably wrong",
                column.chars().take(24).collect::<String>()
            ),
        }
    }
}

pub fn header_warnings(columns: &[String]) -> Vec<HeaderWarning> {
    let warnings: Vec<HeaderWarning> = columns
        .iter()
        .filter_map(|c| {
            let len = c.chars().count();
            if c.starts_with(UNNAMED_PREFIX) {
                Some(HeaderWarning::Placeholder { column: c.clone() })
            } else if len > MAX_PLAUSIBLE_HEADER_LEN {
                Some(HeaderWarning::TooLong {
                    column: c.clone(),
                    len,
                })
            } else {
                None
            }
        })
        .collect();
    for w in &warnings {
        warn!("{w}");
    }
    warnings
}
