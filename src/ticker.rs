use std::sync::Arc;

use serde_json::Value;

use crate::consts::ALL_MODULES;
use crate::envelope::take_key;
use crate::validation::{check_ticker, frequency_fields, Frequency, StatementType};
use crate::{YChartData, YahooConnector, YahooError};

/// One symbol bound to a shared [`YahooConnector`].
///
/// Tickers sharing a connector hold it through an [`Arc`]. The transport is
/// released when the last holder goes away, either by drop or by
/// [`Ticker::close`].
#[derive(Debug, Clone)]
pub struct Ticker {
    symbol: String,
    connector: Arc<YahooConnector>,
}

/// Quote summary module helpers. Modules that wrap a single list are unwrapped
/// to that list.
macro_rules! summary_modules {
    ($($(#[$doc:meta])* $name:ident => $module:literal $(. $list:literal)?;)*) => {
        impl Ticker {
            $(
                $(#[$doc])*
                pub async fn $name(&self) -> Result<Value, YahooError> {
                    let module = self.quote_summary_module($module).await?;
                    $(
                        let module = take_key(module, $list).map_err(|_| {
                            YahooError::MissingKey(format!(
                                "quoteSummary.result[0].{}.{}",
                                $module, $list
                            ))
                        })?;
                    )?
                    Ok(module)
                }
            )*
        }
    };
}

impl Ticker {
    /// Ticker with a connector of its own, using default settings.
    pub fn new(symbol: &str) -> Result<Ticker, YahooError> {
        Self::with_connector(symbol, Arc::new(YahooConnector::new()?))
    }

    pub fn with_connector(
        symbol: &str,
        connector: Arc<YahooConnector>,
    ) -> Result<Ticker, YahooError> {
        Ok(Ticker {
            symbol: check_ticker(symbol)?.to_string(),
            connector,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn connector(&self) -> &Arc<YahooConnector> {
        &self.connector
    }

    /// Let go of the connector and close it if no one else holds it.
    pub async fn close(self) {
        match Arc::into_inner(self.connector) {
            Some(connector) => connector.close().await,
            None => log::debug!("{}: connector still shared, left open", self.symbol),
        }
    }

    /// Chart of this ticker. Dividends and splits are requested as events
    /// when the respective flag is set.
    pub async fn chart(
        &self,
        range: &str,
        interval: &str,
        include_div: bool,
        include_split: bool,
    ) -> Result<Value, YahooError> {
        let events: Vec<&str> = [(include_div, "div"), (include_split, "split")]
            .into_iter()
            .filter_map(|(include, event)| include.then_some(event))
            .collect();
        let events = (!events.is_empty()).then(|| events.join(","));
        self.connector
            .get_chart(&self.symbol, range, interval, events.as_deref())
            .await
    }

    /// Same as [`Ticker::chart`], decoded into [`YChartData`].
    pub async fn chart_data(
        &self,
        range: &str,
        interval: &str,
        include_div: bool,
        include_split: bool,
    ) -> Result<YChartData, YahooError> {
        YChartData::from_json(self.chart(range, interval, include_div, include_split).await?)
    }

    pub async fn quote(&self) -> Result<Value, YahooError> {
        match self.connector.get_quote(&[self.symbol.as_str()]).await? {
            Value::Array(mut quotes) if !quotes.is_empty() => Ok(quotes.swap_remove(0)),
            _ => Err(YahooError::MissingKey("quoteResponse.result[0]".to_string())),
        }
    }

    /// Every quote summary module in one request, keyed by module name.
    pub async fn quote_summary_all_modules(&self) -> Result<Value, YahooError> {
        self.connector
            .get_quote_summary(&self.symbol, ALL_MODULES)
            .await
    }

    async fn quote_summary_module(&self, module: &str) -> Result<Value, YahooError> {
        let summary = self
            .connector
            .get_quote_summary(&self.symbol, &[module])
            .await?;
        take_key(summary, module)
            .map_err(|_| YahooError::MissingKey(format!("quoteSummary.result[0].{module}")))
    }

    /// Fundamentals timeseries of one statement, one series per field.
    ///
    /// Fails before any request for a trailing balance sheet.
    pub async fn financials(
        &self,
        frequency: Frequency,
        statement: StatementType,
        period1: Option<f64>,
        period2: Option<f64>,
    ) -> Result<Value, YahooError> {
        let types = frequency_fields(frequency, statement)?;
        self.connector
            .get_timeseries(&self.symbol, &types, period1, period2)
            .await
    }

    pub async fn income_statement(
        &self,
        frequency: Frequency,
        period1: Option<f64>,
        period2: Option<f64>,
    ) -> Result<Value, YahooError> {
        self.financials(frequency, StatementType::IncomeStatement, period1, period2)
            .await
    }

    /// Balance sheet timeseries. [`Frequency::Trailing`] is rejected.
    pub async fn balance_sheet(
        &self,
        frequency: Frequency,
        period1: Option<f64>,
        period2: Option<f64>,
    ) -> Result<Value, YahooError> {
        self.financials(frequency, StatementType::BalanceSheet, period1, period2)
            .await
    }

    pub async fn cash_flow(
        &self,
        frequency: Frequency,
        period1: Option<f64>,
        period2: Option<f64>,
    ) -> Result<Value, YahooError> {
        self.financials(frequency, StatementType::CashFlow, period1, period2)
            .await
    }

    pub async fn options(&self) -> Result<Value, YahooError> {
        self.connector.get_options(&self.symbol).await
    }

    /// Search results for the symbol, as returned by the API.
    pub async fn search(&self) -> Result<Value, YahooError> {
        self.connector.get_search(&self.symbol).await
    }

    pub async fn recommendations(&self) -> Result<Value, YahooError> {
        self.connector.get_recommendations(&self.symbol).await
    }

    pub async fn insights(&self) -> Result<Value, YahooError> {
        self.connector.get_insights(&self.symbol).await
    }

    pub async fn news(&self, count: u32) -> Result<Value, YahooError> {
        self.connector.get_news(&self.symbol, count).await
    }
}

summary_modules! {
    quote_type => "quoteType";
    asset_profile => "assetProfile";
    summary_profile => "summaryProfile";
    summary_detail => "summaryDetail";
    /// Annual income statements, newest first.
    income_statement_history => "incomeStatementHistory"."incomeStatementHistory";
    income_statement_history_quarterly => "incomeStatementHistoryQuarterly"."incomeStatementHistory";
    balance_sheet_history => "balanceSheetHistory"."balanceSheetStatements";
    balance_sheet_history_quarterly => "balanceSheetHistoryQuarterly"."balanceSheetStatements";
    cashflow_statement_history => "cashflowStatementHistory"."cashflowStatements";
    cashflow_statement_history_quarterly => "cashflowStatementHistoryQuarterly"."cashflowStatements";
    esg_scores => "esgScores";
    price => "price";
    default_key_statistics => "defaultKeyStatistics";
    financial_data => "financialData";
    calendar_events => "calendarEvents";
    sec_filings => "secFilings";
    /// Analyst rating changes.
    upgrade_downgrade_history => "upgradeDowngradeHistory"."history";
    institution_ownership => "institutionOwnership"."ownershipList";
    fund_ownership => "fundOwnership"."ownershipList";
    major_direct_holders => "majorDirectHolders";
    major_holders_breakdown => "majorHoldersBreakdown";
    insider_transactions => "insiderTransactions"."transactions";
    insider_holders => "insiderHolders"."holders";
    net_share_purchase_activity => "netSharePurchaseActivity";
    earnings => "earnings";
    earnings_history => "earningsHistory"."history";
    earnings_trend => "earningsTrend"."trend";
    industry_trend => "industryTrend";
    index_trend => "indexTrend";
    sector_trend => "sectorTrend";
    recommendation_trend => "recommendationTrend"."trend";
    page_views => "pageViews";
}
