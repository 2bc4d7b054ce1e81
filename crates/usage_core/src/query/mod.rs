//! Query compilation.
//!
//! [`compile`] merges an unordered collection of [`Term`]s into an immutable
//! [`Query`]: scalar dimensions keep their last occurrence, list dimensions
//! concatenate in input order. Every URL, title and type value is compiled
//! into a [`StarPattern`] here, so raw user text never reaches storage.
//!
//! A compiled query has two derived forms that agree on filtering:
//!
//! - [`Query::storage_query`] builds the parametrized SQL run by
//!   [`ResultSet`](crate::result_set::ResultSet)
//! - [`Query::matches`] evaluates a single [`Candidate`] in-process, as the
//!   [`ResultWatcher`](crate::watcher::ResultWatcher) does for every event
//!
//! `current()` agents and activities stay unresolved in the query; both forms
//! take an [`ActivityContext`] and resolve them when they run.

mod filter;
mod sql;

pub use filter::{Candidate, Resolved};
pub use sql::StorageQuery;

use usage_db::StarPattern;

use crate::config::{QueryConfig, ZeroLimit};
use crate::context::ActivityContext;
use crate::term::{
    Activity, Agent, Date, Limit, Offset, Order, Select, Target, Term, Type, Url, ANY_TAG,
};
use crate::{CoreError, Result};

/// Mimetype filter: a resource passes if it matches one of `include` (or
/// `include` is unrestricted) and none of `exclude`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeFilter {
    /// `None` means any type.
    pub include: Option<Vec<StarPattern>>,
    pub exclude: Vec<StarPattern>,
}

impl TypeFilter {
    fn from_values(values: &[String]) -> Result<Self> {
        let mut include = Vec::new();
        let mut any = false;
        let mut exclude = Vec::new();

        for value in values {
            if value == ANY_TAG {
                any = true;
            } else if let Some(excluded) = value.strip_prefix('-') {
                exclude.push(compile_pattern("type", excluded)?);
            } else {
                let pattern = compile_pattern("type", value)?;
                any |= pattern.matches_anything();
                include.push(pattern);
            }
        }

        Ok(Self {
            include: (!any && !include.is_empty()).then_some(include),
            exclude,
        })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.include.is_none() && self.exclude.is_empty()
    }
}

fn compile_pattern(dimension: &str, value: &str) -> Result<StarPattern> {
    StarPattern::compile(value)
        .map_err(|e| CoreError::invalid_query(format!("bad {dimension} pattern {value:?}: {e}")))
}

/// A fully resolved, immutable query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    select: Select,
    order: Order,
    limit: Option<i64>,
    offset: i64,
    types: TypeFilter,
    agents: Vec<Target>,
    activities: Vec<Target>,
    urls: Vec<StarPattern>,
    titles: Vec<StarPattern>,
    date: Option<Date>,
}

impl Query {
    pub fn select(&self) -> Select {
        self.select
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// `None` when the query is unbounded.
    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn types(&self) -> &TypeFilter {
        &self.types
    }

    pub fn agents(&self) -> &[Target] {
        &self.agents
    }

    pub fn activities(&self) -> &[Target] {
        &self.activities
    }

    pub fn urls(&self) -> &[StarPattern] {
        &self.urls
    }

    pub fn titles(&self) -> &[StarPattern] {
        &self.titles
    }

    pub fn date(&self) -> Option<Date> {
        self.date
    }

    /// The same filters with a different selection mode.
    pub fn with_select(&self, select: Select) -> Self {
        Self {
            select,
            ..self.clone()
        }
    }

    /// Build the parametrized storage query, resolving `current()` through
    /// `ctx`.
    pub fn storage_query(&self, ctx: &dyn ActivityContext) -> StorageQuery {
        sql::build_results(self, &self.resolve_agents(ctx), &self.resolve_activities(ctx))
    }

    /// Every usage aggregate row passing the filters, ignoring paging.
    pub(crate) fn matching_scores_query(&self, ctx: &dyn ActivityContext) -> StorageQuery {
        sql::build_matching_scores(
            self,
            &self.resolve_agents(ctx),
            &self.resolve_activities(ctx),
        )
    }

    /// Whether a candidate would appear in this query's results, ignoring
    /// ordering and paging.
    pub fn matches(&self, candidate: &Candidate, ctx: &dyn ActivityContext) -> bool {
        filter::matches(
            self,
            candidate,
            &self.resolve_agents(ctx),
            &self.resolve_activities(ctx),
        )
    }

    pub fn resolve_agents(&self, ctx: &dyn ActivityContext) -> Resolved {
        Resolved::new(&self.agents, || ctx.current_agent())
    }

    pub fn resolve_activities(&self, ctx: &dyn ActivityContext) -> Resolved {
        Resolved::new(&self.activities, || ctx.current_activity())
    }
}

/// Compile terms with the default query policy.
pub fn compile<I>(terms: I) -> Result<Query>
where
    I: IntoIterator,
    I::Item: Into<Term>,
{
    compile_with(terms, &QueryConfig::default())
}

/// Compile terms, applying `config`'s default limit and zero-limit policy.
pub fn compile_with<I>(terms: I, config: &QueryConfig) -> Result<Query>
where
    I: IntoIterator,
    I::Item: Into<Term>,
{
    let mut select = None;
    let mut order = None;
    let mut limit = None;
    let mut offset = None;
    let mut date = None;
    let mut types = Vec::new();
    let mut agents = Vec::new();
    let mut activities = Vec::new();
    let mut urls = Vec::new();
    let mut titles = Vec::new();

    for term in terms {
        match term.into() {
            Term::Select(value) => select = Some(value),
            Term::Order(value) => order = Some(value),
            Term::Limit(value) => limit = Some(value),
            Term::Offset(value) => offset = Some(value),
            Term::Date(value) => date = Some(value),
            Term::Type(value) => types.extend(value.values),
            Term::Agent(value) => agents.extend(value.values),
            Term::Activity(value) => activities.extend(value.values),
            Term::Url(value) => urls.extend(value.values),
            Term::Title(value) => titles.extend(value.values),
        }
    }

    let explicit_limit = matches!(limit, Some(Limit::Count(n)) if n > 0);
    let limit = match limit {
        None if config.default_limit > 0 => Some(config.default_limit),
        None => {
            return Err(CoreError::invalid_query(format!(
                "default limit must be positive, got {}",
                config.default_limit
            )))
        }
        Some(Limit::All) => None,
        Some(Limit::Count(n)) if n > 0 => Some(n),
        Some(Limit::Count(n)) => match config.zero_limit {
            ZeroLimit::Unbounded => None,
            ZeroLimit::Reject => {
                return Err(CoreError::invalid_query(format!(
                    "limit must be positive, got {n}"
                )))
            }
        },
    };

    let offset = match offset {
        None | Some(Offset(0)) => 0,
        Some(Offset(n)) if n < 0 => {
            return Err(CoreError::invalid_query(format!(
                "offset must not be negative, got {n}"
            )))
        }
        // The default limit does not count as an explicit one.
        Some(Offset(n)) if !explicit_limit => {
            return Err(CoreError::invalid_query(format!(
                "offset {n} needs an explicit finite limit"
            )))
        }
        Some(Offset(n)) => n,
    };

    if let Some(date) = date {
        if !date.is_valid() {
            return Err(CoreError::invalid_query(format!(
                "date range ends ({}) before it starts ({})",
                date.end, date.start
            )));
        }
    }

    if types.is_empty() {
        types = Type::any().values;
    }
    if agents.is_empty() {
        agents = Agent::current().values;
    }
    if activities.is_empty() {
        activities = Activity::current().values;
    }
    if urls.is_empty() {
        urls = Url::new(["*"]).values;
    }

    Ok(Query {
        select: select.unwrap_or_default(),
        order: order.unwrap_or_default(),
        limit,
        offset,
        types: TypeFilter::from_values(&types)?,
        agents,
        activities,
        urls: urls
            .iter()
            .map(|url| compile_pattern("url", url))
            .collect::<Result<_>>()?,
        titles: titles
            .iter()
            .map(|title| compile_pattern("title", title))
            .collect::<Result<_>>()?,
        date,
    })
}

/// Accumulates terms one at a time; `build()` is equivalent to [`compile`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    terms: Vec<Term>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, term: impl Into<Term>) -> Self {
        self.terms.push(term.into());
        self
    }

    pub fn push(&mut self, term: impl Into<Term>) -> &mut Self {
        self.terms.push(term.into());
        self
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn build(self) -> Result<Query> {
        compile(self.terms)
    }

    pub fn build_with(self, config: &QueryConfig) -> Result<Query> {
        compile_with(self.terms, config)
    }
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}
