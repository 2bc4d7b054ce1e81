//! In-process evaluation of a query's filters.

use chrono::Utc;
use tracing::warn;
use usage_db::{StarPattern, GLOBAL_SENTINEL};

use super::Query;
use crate::term::Target;

/// Agent or activity values with `current()` resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// No filtering on this dimension.
    Any,
    /// One of these stored values. Empty matches nothing.
    Values(Vec<String>),
}

impl Resolved {
    pub(crate) fn new<F>(targets: &[Target], current: F) -> Self
    where
        F: Fn() -> Option<String>,
    {
        let mut values: Vec<String> = Vec::with_capacity(targets.len());
        for target in targets {
            let value = match target {
                Target::Any => return Resolved::Any,
                Target::Global => GLOBAL_SENTINEL.to_string(),
                Target::Named(name) => name.clone(),
                Target::Current => match current() {
                    Some(value) => value,
                    None => {
                        warn!("current() requested but the context has no value; skipped");
                        continue;
                    }
                },
            };
            if !values.contains(&value) {
                values.push(value);
            }
        }
        Resolved::Values(values)
    }

    pub fn contains(&self, value: &str) -> bool {
        match self {
            Resolved::Any => true,
            Resolved::Values(values) => values.iter().any(|v| v == value),
        }
    }
}

/// What is known about a resource when evaluating it against a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub uri: String,
    /// `None` is stored as the global sentinel.
    pub agent: Option<String>,
    /// `None` is stored as the global sentinel.
    pub activity: Option<String>,
    pub mimetype: Option<String>,
    /// Falls back to the URI, as in stored results.
    pub title: Option<String>,
    /// Unix seconds; `None` means now.
    pub timestamp: Option<i64>,
}

impl Candidate {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    pub fn mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

fn any_match(patterns: &[StarPattern], value: &str) -> bool {
    patterns.iter().any(|p| p.is_match(value))
}

pub(super) fn matches(
    query: &Query,
    candidate: &Candidate,
    agents: &Resolved,
    activities: &Resolved,
) -> bool {
    let agent = candidate.agent.as_deref().unwrap_or(GLOBAL_SENTINEL);
    let activity = candidate.activity.as_deref().unwrap_or(GLOBAL_SENTINEL);
    if !agents.contains(agent) || !activities.contains(activity) {
        return false;
    }

    if !any_match(&query.urls, &candidate.uri) {
        return false;
    }

    if !query.titles.is_empty() {
        let title = candidate.title.as_deref().unwrap_or(&candidate.uri);
        if !any_match(&query.titles, title) {
            return false;
        }
    }

    let mimetype = candidate.mimetype.as_deref().unwrap_or("");
    if let Some(include) = &query.types.include {
        if !any_match(include, mimetype) {
            return false;
        }
    }
    if any_match(&query.types.exclude, mimetype) {
        return false;
    }

    if let Some(date) = query.date {
        let (start, end) = date.bounds();
        let timestamp = candidate.timestamp.unwrap_or_else(|| Utc::now().timestamp());
        if timestamp < start || timestamp >= end {
            return false;
        }
    }

    true
}
