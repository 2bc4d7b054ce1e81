//! Query terms.
//!
//! A query is described by an unordered collection of [`Term`]s, one typed
//! directive per dimension: ordering, selection, paging, and filters on
//! mimetype, agent, activity, URL, title and access date.
//!
//! ```rust,ignore
//! use usage_core::term::{Activity, Agent, Select, Term};
//!
//! let terms: Vec<Term> = vec![
//!     Select::LinkedResources.into(),
//!     Agent::global().into(),
//!     Activity::any().into(),
//! ];
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Local, NaiveDate, TimeZone, Utc};
use usage_db::pattern::escape_star_pattern;

/// Tag understood wherever a term value is given as text.
pub const ANY_TAG: &str = ":any";
/// Tag for the global (not agent- or activity-specific) sentinel.
pub const GLOBAL_TAG: &str = ":global";
/// Tag for the lazily resolved current agent or activity.
pub const CURRENT_TAG: &str = ":current";

/// Order in which results are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Resources with the highest scores first
    #[default]
    HighScoredFirst,
    /// Recently used resources first
    RecentlyUsedFirst,
    /// Recently created resources first
    RecentlyCreatedFirst,
    /// By URI, alphabetically
    OrderByUrl,
    /// By title, alphabetically
    OrderByTitle,
}

/// Which resources a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Select {
    /// Resources linked to an activity, or globally
    LinkedResources,
    /// Resources that have been accessed
    #[default]
    UsedResources,
    /// Both of the above
    AllResources,
}

impl Select {
    pub fn includes_linked(self) -> bool {
        matches!(self, Select::LinkedResources | Select::AllResources)
    }

    pub fn includes_used(self) -> bool {
        matches!(self, Select::UsedResources | Select::AllResources)
    }
}

/// How many results to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// At most this many. Zero and negative counts are resolved by the
    /// compiler's [`ZeroLimit`](crate::config::ZeroLimit) policy.
    Count(i64),
    /// No limit.
    All,
}

impl Limit {
    pub fn new(value: i64) -> Self {
        Limit::Count(value)
    }

    pub fn all() -> Self {
        Limit::All
    }
}

/// How many results to skip. Requires an explicit finite [`Limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub i64);

/// An agent or activity selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// No filtering on this dimension
    Any,
    /// Rows not tied to a specific agent/activity
    Global,
    /// The agent/activity current when the query runs
    Current,
    /// A specific agent/activity
    Named(String),
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        match value {
            ANY_TAG => Target::Any,
            GLOBAL_TAG => Target::Global,
            CURRENT_TAG => Target::Current,
            other => Target::Named(other.to_string()),
        }
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        match value.as_str() {
            ANY_TAG | GLOBAL_TAG | CURRENT_TAG => Target::from(value.as_str()),
            _ => Target::Named(value),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Any => f.write_str(ANY_TAG),
            Target::Global => f.write_str(GLOBAL_TAG),
            Target::Current => f.write_str(CURRENT_TAG),
            Target::Named(name) => f.write_str(name),
        }
    }
}

fn targets<I, S>(values: I) -> Vec<Target>
where
    I: IntoIterator<Item = S>,
    S: Into<Target>,
{
    values.into_iter().map(Into::into).collect()
}

fn strings<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

/// Filter on resource mimetypes.
///
/// Values are star patterns; a leading `-` turns a value into an exclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub values: Vec<String>,
}

impl Type {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: strings(values),
        }
    }

    /// Resources of any type.
    pub fn any() -> Self {
        Self::new([ANY_TAG])
    }

    /// Everything but directories.
    pub fn files() -> Self {
        Self::new(["-inode/directory"])
    }

    /// Directories only.
    pub fn directories() -> Self {
        Self::new(["inode/directory"])
    }
}

/// Filter on the agent (application) that accessed or linked a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub values: Vec<Target>,
}

impl Agent {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Target>,
    {
        Self {
            values: targets(values),
        }
    }

    /// Resources accessed or linked by any application.
    pub fn any() -> Self {
        Self::new([Target::Any])
    }

    /// Resources not tied to a specific application.
    pub fn global() -> Self {
        Self::new([Target::Global])
    }

    /// Resources of the application current when the query runs.
    pub fn current() -> Self {
        Self::new([Target::Current])
    }
}

/// Filter on the activity a resource was accessed in or linked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub values: Vec<Target>,
}

impl Activity {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Target>,
    {
        Self {
            values: targets(values),
        }
    }

    /// Resources of any activity.
    pub fn any() -> Self {
        Self::new([Target::Any])
    }

    /// Resources linked to all activities.
    pub fn global() -> Self {
        Self::new([Target::Global])
    }

    /// Resources of the activity current when the query runs.
    pub fn current() -> Self {
        Self::new([Target::Current])
    }
}

/// Filter on resource URIs, as star patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub values: Vec<String>,
}

impl Url {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: strings(values),
        }
    }

    /// URIs starting with a literal prefix.
    pub fn starts_with(prefix: &str) -> Self {
        Self::new([format!("{}*", escape_star_pattern(prefix))])
    }

    /// URIs containing a literal infix.
    pub fn contains(infix: &str) -> Self {
        Self::new([format!("*{}*", escape_star_pattern(infix))])
    }

    /// Local files.
    pub fn local_file() -> Self {
        Self::new(["/*"])
    }

    /// Local files and the common remote file protocols.
    pub fn file() -> Self {
        Self::new(["/*", "smb:*", "fish:*", "sftp:*", "ftp:*"])
    }
}

/// Filter on resource titles, as star patterns.
///
/// Resources without a known title are matched on their URI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Title {
    pub values: Vec<String>,
}

impl Title {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            values: vec![pattern.into()],
        }
    }
}

/// Filter on the access (or link) date, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Date {
    /// A single day.
    pub fn on(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// A range of days. Inverted ranges are rejected by the compiler.
    pub fn range(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn today() -> Self {
        Self::on(Local::now().date_naive())
    }

    pub fn yesterday() -> Self {
        let today = Local::now().date_naive();
        Self::on(today.pred_opt().unwrap_or(today))
    }

    /// Monday through Sunday of the current week.
    pub fn current_week() -> Self {
        Self::week_of(Local::now().date_naive())
    }

    /// Monday through Sunday of the week before the current one.
    pub fn previous_week() -> Self {
        let today = Local::now().date_naive();
        Self::week_of(today.checked_sub_days(Days::new(7)).unwrap_or(today))
    }

    fn week_of(day: NaiveDate) -> Self {
        let from_monday = u64::from(day.weekday().num_days_from_monday());
        let start = day.checked_sub_days(Days::new(from_monday)).unwrap_or(day);
        let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Half-open unix timestamp bounds `[start, end)` in local time.
    pub fn bounds(&self) -> (i64, i64) {
        let end = self.end.checked_add_days(Days::new(1)).unwrap_or(self.end);
        (local_midnight(self.start), local_midnight(end))
    }
}

fn local_midnight(day: NaiveDate) -> i64 {
    let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).timestamp())
}

/// Parses `YYYY-MM-DD` or `YYYY-MM-DD,YYYY-MM-DD`.
impl FromStr for Date {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((start, end)) => Ok(Self::range(
                NaiveDate::from_str(start.trim())?,
                NaiveDate::from_str(end.trim())?,
            )),
            None => Ok(Self::on(NaiveDate::from_str(s.trim())?)),
        }
    }
}

/// One directive contributed to a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Order(Order),
    Select(Select),
    Limit(Limit),
    Offset(Offset),
    Type(Type),
    Agent(Agent),
    Activity(Activity),
    Url(Url),
    Title(Title),
    Date(Date),
}

macro_rules! impl_into_term {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Term {
                fn from(value: $variant) -> Self {
                    Term::$variant(value)
                }
            }
        )*
    };
}

impl_into_term!(Order, Select, Limit, Offset, Type, Agent, Activity, Url, Title, Date);

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Order::HighScoredFirst => "HighScoredFirst",
            Order::RecentlyUsedFirst => "RecentlyUsedFirst",
            Order::RecentlyCreatedFirst => "RecentlyCreatedFirst",
            Order::OrderByUrl => "OrderByUrl",
            Order::OrderByTitle => "OrderByTitle",
        };
        write!(f, "Order: {name}")
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Select::LinkedResources => "LinkedResources",
            Select::UsedResources => "UsedResources",
            Select::AllResources => "AllResources",
        };
        write!(f, "Select: {name}")
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Count(n) => write!(f, "Limit: {n}"),
            Limit::All => f.write_str("Limit: all"),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset: {}", self.0)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Type: ")?;
        join(f, &self.values)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Agent: ")?;
        join(f, &self.values)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Activity: ")?;
        join(f, &self.values)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Url: ")?;
        join(f, &self.values)
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Title: ")?;
        join(f, &self.values)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "Date: {}", self.start)
        } else {
            write!(f, "Date: {},{}", self.start, self.end)
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Order(t) => fmt::Display::fmt(t, f),
            Term::Select(t) => fmt::Display::fmt(t, f),
            Term::Limit(t) => fmt::Display::fmt(t, f),
            Term::Offset(t) => fmt::Display::fmt(t, f),
            Term::Type(t) => fmt::Display::fmt(t, f),
            Term::Agent(t) => fmt::Display::fmt(t, f),
            Term::Activity(t) => fmt::Display::fmt(t, f),
            Term::Url(t) => fmt::Display::fmt(t, f),
            Term::Title(t) => fmt::Display::fmt(t, f),
            Term::Date(t) => fmt::Display::fmt(t, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_target_tags_parse() {
        assert_eq!(Target::from(":any"), Target::Any);
        assert_eq!(Target::from(":global"), Target::Global);
        assert_eq!(Target::from(String::from(":current")), Target::Current);
        assert_eq!(
            Target::from("org.kde.konsole"),
            Target::Named("org.kde.konsole".to_string())
        );
        assert_eq!(
            Agent::new(["kate", ":global"]).values,
            vec![Target::Named("kate".to_string()), Target::Global]
        );
    }

    #[test]
    fn test_url_helpers_escape_literals() {
        assert_eq!(Url::starts_with("/home/a*b").values, vec![r"/home/a\*b*"]);
        assert_eq!(Url::contains(r"c:\x").values, vec![r"*c:\\x*"]);
        assert_eq!(Url::file().values.len(), 5);
    }

    #[test]
    fn test_date_parsing_and_single_day_range() {
        let single: Date = "2015-06-01".parse().unwrap();
        assert_eq!(single, Date::range(day(2015, 6, 1), day(2015, 6, 1)));

        let range: Date = "2015-06-01, 2015-06-07".parse().unwrap();
        assert_eq!(range.start, day(2015, 6, 1));
        assert_eq!(range.end, day(2015, 6, 7));
        assert!(range.is_valid());

        assert!("yesterday-ish".parse::<Date>().is_err());
        assert!(!Date::range(day(2015, 6, 7), day(2015, 6, 1)).is_valid());
    }

    #[test]
    fn test_date_bounds_cover_whole_days() {
        let date = Date::on(day(2020, 1, 15));
        let (start, end) = date.bounds();
        assert_eq!(start, local_midnight(day(2020, 1, 15)));
        assert_eq!(end, local_midnight(day(2020, 1, 16)));
        assert!(end > start);
    }

    #[test]
    fn test_weeks_start_on_monday() {
        // 2015-06-03 was a Wednesday
        let week = Date::week_of(day(2015, 6, 3));
        assert_eq!(week, Date::range(day(2015, 6, 1), day(2015, 6, 7)));
        assert!(Date::current_week().is_valid());
        assert!(Date::previous_week().end < Date::current_week().start);
        assert_eq!(Date::yesterday().start.succ_opt(), Some(Date::today().start));
    }

    #[test]
    fn test_display() {
        let terms: Vec<Term> = vec![
            Select::LinkedResources.into(),
            Agent::global().into(),
            Activity::new(["act-1", ":current"]).into(),
            Limit::new(10).into(),
            Date::on(day(2015, 6, 1)).into(),
        ];
        let rendered: Vec<String> = terms.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "Select: LinkedResources",
                "Agent: :global",
                "Activity: act-1, :current",
                "Limit: 10",
                "Date: 2015-06-01",
            ]
        );
    }
}
