//! Checks of caller supplied arguments against the allow-lists in
//! [`consts`](crate::consts). Every check runs before a request is issued.

use std::fmt;
use std::str::FromStr;

use time::macros::datetime;
use time::OffsetDateTime;

use crate::consts::{
    BALANCE_SHEET_FIELDS, CASH_FLOW_FIELDS, EVENTS, FREQUENCIES, INCOME_STATEMENT_FIELDS,
    INTERVALS, RANGES, STATEMENT_TYPES,
};
use crate::{Params, YahooError};

/// Log the message and turn it into a validation error.
pub(crate) fn invalid(msg: String) -> YahooError {
    log::error!("{msg}");
    YahooError::InvalidParameter(msg)
}

/// Reporting cadence of fundamentals timeseries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Annual,
    Quarterly,
    /// Trailing twelve months.
    Trailing,
}

impl Frequency {
    pub const ALL: [Frequency; 3] = [Frequency::Annual, Frequency::Quarterly, Frequency::Trailing];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Annual => "annual",
            Frequency::Quarterly => "quarterly",
            Frequency::Trailing => "trailing",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = YahooError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| invalid(format!("Invalid frequency={s:?}. Valid values: {FREQUENCIES:?}")))
    }
}

/// Financial statement family of fundamentals timeseries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementType {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl StatementType {
    pub const ALL: [StatementType; 3] = [
        StatementType::IncomeStatement,
        StatementType::BalanceSheet,
        StatementType::CashFlow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "income_statement",
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::CashFlow => "cash_flow",
        }
    }

    /// Field names without frequency prefix.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            StatementType::IncomeStatement => INCOME_STATEMENT_FIELDS,
            StatementType::BalanceSheet => BALANCE_SHEET_FIELDS,
            StatementType::CashFlow => CASH_FLOW_FIELDS,
        }
    }

    /// A balance sheet is a point in time, there is no trailing variant.
    fn supports(self, frequency: Frequency) -> bool {
        !(self == StatementType::BalanceSheet && frequency == Frequency::Trailing)
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementType {
    type Err = YahooError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                invalid(format!(
                    "Invalid statement type={s:?}. Valid values: {STATEMENT_TYPES:?}"
                ))
            })
    }
}

/// Timeseries type names for one statement, prefixed with the frequency,
/// e.g. `annualTotalRevenue, annualNetIncome, ...`.
pub fn frequency_fields(
    frequency: Frequency,
    statement: StatementType,
) -> Result<Vec<String>, YahooError> {
    if !statement.supports(frequency) {
        return Err(invalid(format!(
            "frequency={frequency} not allowed for {statement}"
        )));
    }
    Ok(statement
        .fields()
        .iter()
        .map(|field| format!("{frequency}{field}"))
        .collect())
}

/// Whether `name` is a frequency prefixed field of a legal
/// (frequency, statement) pair.
pub fn is_valid_type(name: &str) -> bool {
    Frequency::ALL.into_iter().any(|frequency| {
        name.strip_prefix(frequency.as_str()).map_or(false, |field| {
            StatementType::ALL
                .into_iter()
                .any(|statement| statement.supports(frequency) && statement.fields().contains(&field))
        })
    })
}

pub(crate) fn check_ticker(ticker: &str) -> Result<&str, YahooError> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(invalid("ticker must not be empty".to_string()));
    }
    Ok(ticker)
}

pub(crate) fn check_one<'a>(
    what: &str,
    value: &'a str,
    allowed: &[&str],
) -> Result<&'a str, YahooError> {
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(invalid(format!(
            "Invalid {what}={value:?}. Valid values: {allowed:?}"
        )))
    }
}

/// Split comma separated items, trim and deduplicate them (first occurrence
/// wins) and reject everything `is_valid` refuses. All offenders are reported
/// at once.
pub(crate) fn check_list<S, F>(what: &str, items: &[S], is_valid: F) -> Result<Vec<String>, YahooError>
where
    S: AsRef<str>,
    F: Fn(&str) -> bool,
{
    let mut parsed: Vec<String> = Vec::new();
    let mut rejected: Vec<&str> = Vec::new();

    for item in items.iter().flat_map(|i| i.as_ref().split(',')).map(str::trim) {
        if !is_valid(item) {
            rejected.push(item);
        } else if !parsed.iter().any(|p| p == item) {
            parsed.push(item.to_string());
        }
    }

    if !rejected.is_empty() {
        return Err(invalid(format!("Invalid {what}={rejected:?}")));
    }
    if parsed.is_empty() {
        return Err(invalid(format!("no {what} given")));
    }
    Ok(parsed)
}

pub(crate) fn check_range(range: &str) -> Result<&str, YahooError> {
    check_one("range", range, RANGES)
}

pub(crate) fn check_interval(interval: &str) -> Result<&str, YahooError> {
    check_one("interval", interval, INTERVALS)
}

pub(crate) fn check_events(events: &str) -> Result<String, YahooError> {
    check_list("events", &[events], |e| EVENTS.contains(&e)).map(|events| events.join(","))
}

/// Unix timestamp of the default start of a timeseries window.
pub(crate) fn default_period_start() -> i64 {
    datetime!(2020-01-01 0:00 UTC).unix_timestamp()
}

/// Resolve the timeseries window. Each missing bound is defaulted on its own:
/// the start to 2020-01-01, the end to `now`. Fractional seconds are cut off,
/// never rounded.
pub(crate) fn resolve_period(
    period1: Option<f64>,
    period2: Option<f64>,
    now: OffsetDateTime,
) -> Result<(i64, i64), YahooError> {
    let start = match period1 {
        Some(p) => truncate("period1", p)?,
        None => default_period_start(),
    };
    let end = match period2 {
        Some(p) => truncate("period2", p)?,
        None => now.unix_timestamp(),
    };
    Ok((start, end))
}

fn truncate(what: &str, value: f64) -> Result<i64, YahooError> {
    if !value.is_finite() {
        return Err(invalid(format!("{what}={value} is not a finite timestamp")));
    }
    Ok(value.trunc() as i64)
}

/// Render a URL with its query string, percent encoded, for logging.
pub fn compile_url(url: &str, params: &Params) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    match reqwest::Url::parse_with_params(url, params.iter()) {
        Ok(url) => url.to_string(),
        Err(_) => {
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{url}?{}", query.join("&"))
        }
    }
}
