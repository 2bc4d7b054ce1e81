//! Storage query construction.
//!
//! Results are assembled from two branches over the store: links from
//! `resource_link` and usage aggregates from `resource_score`. Each branch
//! carries the same filters, then rows are grouped per resource. Every user
//! value is bound as a parameter; patterns go through `LIKE ... ESCAPE`.

use usage_db::{SqlParam, StarPattern};

use super::{Query, Resolved};
use crate::term::{Order, Select};

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Which table a branch reads.
#[derive(Debug, Clone, Copy)]
enum Branch {
    Linked,
    Used,
}

impl Branch {
    fn table(self) -> &'static str {
        match self {
            Branch::Linked => "resource_link",
            Branch::Used => "resource_score",
        }
    }

    fn timestamp_column(self) -> &'static str {
        match self {
            Branch::Linked => "b.linked_at",
            Branch::Used => "b.last_update",
        }
    }
}

#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl Conditions {
    fn values(&mut self, column: &str, resolved: &Resolved) {
        match resolved {
            Resolved::Any => {}
            Resolved::Values(values) if values.is_empty() => self.clauses.push("0".to_string()),
            Resolved::Values(values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                self.clauses.push(format!("{column} IN ({placeholders})"));
                self.params
                    .extend(values.iter().map(|v| SqlParam::from(v.as_str())));
            }
        }
    }

    fn like_any(&mut self, expr: &str, patterns: &[StarPattern]) {
        if patterns.is_empty() || patterns.iter().any(StarPattern::matches_anything) {
            return;
        }
        let alternatives: Vec<String> = patterns
            .iter()
            .map(|p| {
                self.params.push(p.like().into());
                format!(r"{expr} LIKE ? ESCAPE '\'")
            })
            .collect();
        self.clauses.push(format!("({})", alternatives.join(" OR ")));
    }

    fn not_like(&mut self, expr: &str, patterns: &[StarPattern]) {
        for pattern in patterns {
            self.params.push(pattern.like().into());
            self.clauses.push(format!(r"{expr} NOT LIKE ? ESCAPE '\'"));
        }
    }

    fn between(&mut self, column: &str, start: i64, end: i64) {
        self.clauses.push(format!("{column} >= ? AND {column} < ?"));
        self.params.push(start.into());
        self.params.push(end.into());
    }

    fn render(&self) -> String {
        if self.clauses.is_empty() {
            "1".to_string()
        } else {
            self.clauses.join("\n          AND ")
        }
    }
}

fn branch_conditions(
    query: &Query,
    branch: Branch,
    agents: &Resolved,
    activities: &Resolved,
) -> Conditions {
    let mut conditions = Conditions::default();
    conditions.values("b.agent", agents);
    conditions.values("b.activity", activities);
    conditions.like_any("b.resource", &query.urls);
    conditions.like_any("COALESCE(ri.title, b.resource)", &query.titles);
    if let Some(include) = &query.types.include {
        conditions.like_any("COALESCE(ri.mimetype, '')", include);
    }
    conditions.not_like("COALESCE(ri.mimetype, '')", &query.types.exclude);
    if let Some(date) = query.date {
        let (start, end) = date.bounds();
        conditions.between(branch.timestamp_column(), start, end);
    }
    conditions
}

fn branch_sql(branch: Branch, conditions: &Conditions) -> String {
    // Linked rows carry no score so a resource both linked and used is not
    // counted twice.
    let columns = match branch {
        Branch::Linked => {
            "b.resource, b.agent, b.activity, 0.0 AS score, \
             NULL AS first_update, NULL AS last_update, b.linked_at AS created_at"
        }
        Branch::Used => {
            "b.resource, b.agent, b.activity, b.score, \
             b.first_update, b.last_update, b.first_update AS created_at"
        }
    };
    format!(
        "SELECT {columns}\n        FROM {table} b\n        LEFT JOIN resource_info ri ON ri.resource = b.resource\n        WHERE {where_}",
        table = branch.table(),
        where_ = conditions.render(),
    )
}

fn order_by(order: Order) -> &'static str {
    match order {
        Order::HighScoredFirst => "score DESC, last_update DESC, resource ASC",
        Order::RecentlyUsedFirst => "last_update DESC, score DESC, resource ASC",
        Order::RecentlyCreatedFirst => "MIN(m.created_at) DESC, resource ASC",
        Order::OrderByUrl => "resource ASC",
        Order::OrderByTitle => "title ASC, resource ASC",
    }
}

fn branches(select: Select) -> Vec<Branch> {
    let mut branches = Vec::with_capacity(2);
    if select.includes_linked() {
        branches.push(Branch::Linked);
    }
    if select.includes_used() {
        branches.push(Branch::Used);
    }
    branches
}

pub(super) fn build_results(query: &Query, agents: &Resolved, activities: &Resolved) -> StorageQuery {
    let mut params = Vec::new();
    let mut parts = Vec::new();
    for branch in branches(query.select) {
        let conditions = branch_conditions(query, branch, agents, activities);
        parts.push(branch_sql(branch, &conditions));
        params.extend(conditions.params);
    }

    let sql = format!(
        r#"WITH matched AS (
        {branches}
)
SELECT
    m.resource AS resource,
    COALESCE(ri.title, m.resource) AS title,
    ri.mimetype AS mimetype,
    TOTAL(m.score) AS score,
    MIN(m.first_update) AS first_update,
    MAX(m.last_update) AS last_update,
    EXISTS (SELECT 1 FROM resource_link l WHERE l.resource = m.resource) AS linked,
    (SELECT json_group_array(DISTINCT l.activity) FROM resource_link l
        WHERE l.resource = m.resource) AS linked_activities,
    CASE WHEN COUNT(DISTINCT m.agent) = 1 THEN MIN(m.agent) END AS agent,
    CASE WHEN COUNT(DISTINCT m.activity) = 1 THEN MIN(m.activity) END AS activity
FROM matched m
LEFT JOIN resource_info ri ON ri.resource = m.resource
GROUP BY m.resource
ORDER BY {order}
LIMIT ? OFFSET ?"#,
        branches = parts.join("\n        UNION ALL\n        "),
        order = order_by(query.order),
    );

    // SQLite reads a negative limit as no limit.
    params.push(query.limit.unwrap_or(-1).into());
    params.push(query.offset.into());

    StorageQuery { sql, params }
}

/// Usage aggregates whose rows pass the query's filters, for forgetting.
///
/// Paging and ordering do not apply.
pub(crate) fn build_matching_scores(
    query: &Query,
    agents: &Resolved,
    activities: &Resolved,
) -> StorageQuery {
    let conditions = branch_conditions(query, Branch::Used, agents, activities);
    let sql = format!(
        r#"SELECT b.activity, b.agent, b.resource, b.score, b.first_update, b.last_update
FROM resource_score b
LEFT JOIN resource_info ri ON ri.resource = b.resource
WHERE {}
ORDER BY b.resource ASC, b.activity ASC, b.agent ASC"#,
        conditions.render()
    );
    StorageQuery {
        sql,
        params: conditions.params,
    }
}
