//! Integration tests for query compilation and its two derived forms.
//!
//! A resource passes the in-process filter exactly when the one-shot query
//! lists it, so both forms are checked against the same stored rows.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use usage_core::prelude::*;
use usage_core::{Candidate, CoreError, StatsConfig};
use usage_db::models::ResourceScore;
use usage_db::{queries, DatabaseRegistry, StorageConfig};

struct Row {
    activity: &'static str,
    agent: &'static str,
    resource: &'static str,
    last_update: i64,
}

const ROWS: &[Row] = &[
    Row {
        activity: "act-1",
        agent: "konsole",
        resource: "/home/user/script.sh",
        last_update: 1_000,
    },
    Row {
        activity: "act-1",
        agent: ":global",
        resource: "/home/user/notes.txt",
        last_update: 2_000,
    },
    Row {
        activity: "act-2",
        agent: "kate",
        resource: "smb://server/100%_done.odt",
        last_update: 3_000,
    },
    Row {
        activity: ":global",
        agent: "kate",
        resource: "/tmp/report_a.txt",
        last_update: 4_000,
    },
];

async fn seeded_stats(temp_dir: &TempDir) -> Stats {
    let config = StatsConfig {
        database: StorageConfig::at(temp_dir.path()),
        ..StatsConfig::default()
    };
    let registry = DatabaseRegistry::new(config.database.clone());
    let ctx = Arc::new(SharedContext::new(
        Some("act-1".to_string()),
        Some("kate".to_string()),
    ));
    let stats = Stats::open(&registry, EventBus::new(16), ctx, config)
        .await
        .unwrap();

    for row in ROWS {
        queries::upsert_score(
            stats.database(),
            &ResourceScore {
                activity: row.activity.to_string(),
                agent: row.agent.to_string(),
                resource: row.resource.to_string(),
                score: 1.0,
                first_update: row.last_update,
                last_update: row.last_update,
            },
        )
        .await
        .unwrap();
    }
    stats
}

/// Resources listed by the one-shot query and resources accepted by the
/// in-process filter, both sorted.
async fn both_forms(stats: &Stats, terms: Vec<Term>) -> (Vec<String>, Vec<String>) {
    let query = stats.compile(terms).unwrap();

    let mut listed: Vec<String> = stats
        .results(query.clone())
        .fetch_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.resource)
        .collect();
    listed.sort();

    let ctx = stats.context().as_ref();
    let mut accepted: Vec<String> = ROWS
        .iter()
        .filter(|row| {
            let candidate = Candidate::new(row.resource)
                .agent(row.agent)
                .activity(row.activity)
                .timestamp(row.last_update);
            query.matches(&candidate, ctx)
        })
        .map(|row| row.resource.to_string())
        .collect();
    accepted.sort();
    accepted.dedup();

    (listed, accepted)
}

#[tokio::test]
async fn test_agent_global_differs_from_any() {
    let temp_dir = TempDir::new().unwrap();
    let stats = seeded_stats(&temp_dir).await;

    let (any, any_accepted) = both_forms(
        &stats,
        vec![Agent::any().into(), Activity::new(["act-1"]).into()],
    )
    .await;
    assert_eq!(any, vec!["/home/user/notes.txt", "/home/user/script.sh"]);
    assert_eq!(any, any_accepted);

    let (global, global_accepted) = both_forms(
        &stats,
        vec![Agent::global().into(), Activity::new(["act-1"]).into()],
    )
    .await;
    assert_eq!(global, vec!["/home/user/notes.txt"]);
    assert_eq!(global, global_accepted);
    assert!(!global.contains(&"/home/user/script.sh".to_string()));
}

#[tokio::test]
async fn test_forms_agree_across_filters() {
    let temp_dir = TempDir::new().unwrap();
    let stats = seeded_stats(&temp_dir).await;

    let cases: Vec<Vec<Term>> = vec![
        vec![],
        vec![Agent::any().into(), Activity::any().into()],
        vec![Agent::current().into(), Activity::any().into()],
        vec![Agent::any().into(), Activity::global().into()],
        vec![
            Agent::any().into(),
            Activity::any().into(),
            Url::starts_with("smb://server/100%_").into(),
        ],
        vec![
            Agent::any().into(),
            Activity::any().into(),
            // `_` and `%` are literals, not LIKE wildcards.
            Url::new(["/tmp/report%a.txt", "/tmp/report_?.txt"]).into(),
        ],
        vec![
            Agent::any().into(),
            Activity::any().into(),
            Url::new(["/home/*", "*.odt"]).into(),
            Title::new("*user*").into(),
        ],
        vec![
            Agent::new(["kate", "konsole"]).into(),
            Activity::new(["act-1", "act-2"]).into(),
        ],
    ];

    for terms in cases {
        let rendered: Vec<String> = terms.iter().map(ToString::to_string).collect();
        let (listed, accepted) = both_forms(&stats, terms).await;
        assert_eq!(listed, accepted, "forms disagree for {rendered:?}");
    }
}

#[tokio::test]
async fn test_paging_compiles_and_runs() {
    let temp_dir = TempDir::new().unwrap();
    let stats = seeded_stats(&temp_dir).await;
    let base = || vec![Term::from(Agent::any()), Activity::any().into(), Order::OrderByUrl.into()];

    let mut terms = base();
    terms.extend([Limit::new(2).into(), Offset(1).into()]);
    let query = stats.compile(terms).unwrap();
    assert_eq!(query.limit(), Some(2));
    assert_eq!(query.offset(), 1);

    let resources: Vec<String> = stats
        .results(query)
        .fetch_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.resource)
        .collect();
    assert_eq!(resources, vec!["/home/user/script.sh", "/tmp/report_a.txt"]);

    let mut terms = base();
    terms.push(Offset(1).into());
    assert!(matches!(
        stats.compile(terms),
        Err(CoreError::InvalidQuery { .. })
    ));
}

#[tokio::test]
async fn test_date_filter_uses_last_update() {
    let temp_dir = TempDir::new().unwrap();
    let stats = seeded_stats(&temp_dir).await;

    // The local day containing unix second 2_000.
    let day = chrono::DateTime::from_timestamp(2_000, 0)
        .unwrap()
        .with_timezone(&chrono::Local)
        .date_naive();
    let (listed, accepted) = both_forms(
        &stats,
        vec![Agent::any().into(), Activity::any().into(), Date::on(day).into()],
    )
    .await;
    assert_eq!(listed, accepted);
    assert!(listed.contains(&"/home/user/notes.txt".to_string()));
}
