//! Typed view of the payload returned by
//! [`YahooConnector::get_chart`](crate::YahooConnector::get_chart).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::YahooError;

#[cfg(not(feature = "decimal"))]
pub mod decimal {
    pub type Decimal = f64;
    pub const ZERO: Decimal = 0.0;
}

#[cfg(feature = "decimal")]
pub mod decimal {
    pub type Decimal = rust_decimal::Decimal;
    pub const ZERO: Decimal = Decimal::ZERO;
}

use decimal::{Decimal, ZERO};

/// One bar of the chart
#[derive(Debug, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct Quote {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: u64,
    pub close: Decimal,
    pub adjclose: Decimal,
}

/// Chart of one symbol: `chart.result[0]` of the raw response.
#[derive(Deserialize, Debug, Clone)]
pub struct YChartData {
    pub meta: YMetaData,
    /// Missing when the range holds no bars.
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub events: Option<YChartEvents>,
    #[serde(default)]
    pub indicators: YQuoteIndicators,
}

/// Chart metadata. Yahoo! drops fields depending on the instrument, so
/// everything but the symbol is optional.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct YMetaData {
    pub symbol: String,
    pub currency: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub instrument_type: Option<String>,
    pub exchange_name: Option<String>,
    pub full_exchange_name: Option<String>,
    pub first_trade_date: Option<i64>,
    pub regular_market_time: Option<i64>,
    pub gmtoffset: Option<i32>,
    pub timezone: Option<String>,
    pub exchange_timezone_name: Option<String>,
    pub regular_market_price: Option<Decimal>,
    pub chart_previous_close: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    pub fifty_two_week_high: Option<Decimal>,
    pub fifty_two_week_low: Option<Decimal>,
    pub regular_market_volume: Option<u64>,
    pub price_hint: Option<i32>,
    pub data_granularity: Option<String>,
    pub range: Option<String>,
    #[serde(default)]
    pub valid_ranges: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct YQuoteIndicators {
    #[serde(default)]
    pub quote: Vec<YQuoteColumns>,
    #[serde(default)]
    pub adjclose: Vec<YAdjCloseColumn>,
}

/// Price and volume columns, aligned with [`YChartData::timestamp`]. Yahoo!
/// reports `null` for bars without trades.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct YQuoteColumns {
    pub open: Option<Vec<Option<Decimal>>>,
    pub high: Option<Vec<Option<Decimal>>>,
    pub low: Option<Vec<Option<Decimal>>>,
    pub close: Option<Vec<Option<Decimal>>>,
    pub volume: Option<Vec<Option<u64>>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct YAdjCloseColumn {
    pub adjclose: Option<Vec<Option<Decimal>>>,
}

/// Events keyed by the timestamp yahoo! uses as map key.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct YChartEvents {
    pub splits: Option<HashMap<String, Split>>,
    pub dividends: Option<HashMap<String, Dividend>>,
    pub capital_gains: Option<HashMap<String, CapitalGain>>,
}

/// A split that took effect within the chart range.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    pub date: i64,
    /// For a 1:5 split, 5 shares are held for every share held before. A
    /// reverse split has numerator > denominator.
    pub numerator: Decimal,
    pub denominator: Decimal,
    pub split_ratio: String,
}

/// Dividend paid within the chart range, dated at the ex-dividend date.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Dividend {
    pub amount: Decimal,
    pub date: i64,
}

/// Capital gain distributed by a mutual fund within the chart range.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CapitalGain {
    pub amount: Decimal,
    pub date: i64,
}

fn column<T: Copy>(values: &Option<Vec<Option<T>>>, i: usize) -> Option<T> {
    values.as_ref().and_then(|v| v.get(i).copied().flatten())
}

fn sorted_by_date<T: Clone>(events: Option<&HashMap<String, T>>, date: fn(&T) -> i64) -> Vec<T> {
    let mut data: Vec<T> = events.map(|e| e.values().cloned().collect()).unwrap_or_default();
    data.sort_unstable_by_key(date);
    data
}

impl YChartData {
    pub fn from_json(json: Value) -> Result<YChartData, YahooError> {
        Ok(serde_json::from_value(json)?)
    }

    /// Every price and volume column must be present and as long as the
    /// timestamp list.
    fn check_consistency(&self) -> Result<&YQuoteColumns, YahooError> {
        let n = self.timestamp.len();
        if n == 0 {
            return Err(YahooError::NoQuotes);
        }
        let columns = self
            .indicators
            .quote
            .first()
            .ok_or(YahooError::DataInconsistency)?;

        let lengths = [
            columns.open.as_ref().map(Vec::len),
            columns.high.as_ref().map(Vec::len),
            columns.low.as_ref().map(Vec::len),
            columns.close.as_ref().map(Vec::len),
            columns.volume.as_ref().map(Vec::len),
        ];
        if lengths.iter().any(|len| *len != Some(n)) {
            log::warn!("{}: quote columns do not match {n} timestamps", self.meta.symbol);
            return Err(YahooError::DataInconsistency);
        }
        Ok(columns)
    }

    /// The bar at position `i`, `None` if it has no close price.
    fn quote_at(&self, columns: &YQuoteColumns, i: usize) -> Option<Quote> {
        let close = column(&columns.close, i)?;
        let adjclose = self
            .indicators
            .adjclose
            .first()
            .and_then(|a| column(&a.adjclose, i));
        Some(Quote {
            timestamp: *self.timestamp.get(i)?,
            open: column(&columns.open, i).unwrap_or(ZERO),
            high: column(&columns.high, i).unwrap_or(ZERO),
            low: column(&columns.low, i).unwrap_or(ZERO),
            volume: column(&columns.volume, i).unwrap_or(0),
            close,
            adjclose: adjclose.unwrap_or(ZERO),
        })
    }

    /// All bars that have a close price, oldest first.
    pub fn quotes(&self) -> Result<Vec<Quote>, YahooError> {
        let columns = self.check_consistency()?;
        Ok((0..self.timestamp.len())
            .filter_map(|i| self.quote_at(columns, i))
            .collect())
    }

    /// The latest bar that has a close price.
    pub fn last_quote(&self) -> Result<Quote, YahooError> {
        let columns = self.check_consistency()?;
        (0..self.timestamp.len())
            .rev()
            .find_map(|i| self.quote_at(columns, i))
            .ok_or(YahooError::NoQuotes)
    }

    pub fn metadata(&self) -> &YMetaData {
        &self.meta
    }

    /// Splits within the range, oldest first.
    pub fn splits(&self) -> Vec<Split> {
        let splits = self.events.as_ref().and_then(|e| e.splits.as_ref());
        sorted_by_date(splits, |s| s.date)
    }

    /// Dividends within the range, oldest first.
    pub fn dividends(&self) -> Vec<Dividend> {
        let dividends = self.events.as_ref().and_then(|e| e.dividends.as_ref());
        sorted_by_date(dividends, |d| d.date)
    }

    /// Capital gains within the range, oldest first. Only mutual funds have them.
    pub fn capital_gains(&self) -> Vec<CapitalGain> {
        let gains = self.events.as_ref().and_then(|e| e.capital_gains.as_ref());
        sorted_by_date(gains, |g| g.date)
    }
}
