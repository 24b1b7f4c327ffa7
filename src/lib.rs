//! # yafin
//!
//! An asynchronous client for the undocumented [yahoo! finance](https://finance.yahoo.com)
//! API: charts, quotes, quote summary modules, fundamentals timeseries, options,
//! search, recommendations, insights, market summaries, trending tickers,
//! currencies and news. This project is licensed under Apache 2.0 or MIT license.
//!
//! Two layers are provided:
//!
//! * [`YahooConnector`] talks to the API. It owns the HTTP transport, fetches
//!   the `crumb` token some endpoints require, validates enum-like arguments
//!   before anything goes over the wire and strips the
//!   `{"<category>": {"result": ..., "error": ...}}` wrapper from responses.
//! * [`Ticker`] binds one symbol to a shared connector and adds per-module and
//!   per-statement helpers.
//!
//! All payloads are returned as [`serde_json::Value`]; [`YChartData`] offers a
//! typed view of chart payloads.
//!
//! # Get the chart of the last month:
//! ```no_run
//! use yafin::{consts::DEFAULT_EVENTS, YahooConnector};
//!
//! let provider = YahooConnector::new().unwrap();
//! let chart =
//!     tokio_test::block_on(provider.get_chart("AAPL", "1mo", "1d", Some(DEFAULT_EVENTS))).unwrap();
//! println!("{}", chart["meta"]["symbol"]);
//! ```
//!
//! # Share one connector between several tickers:
//! ```no_run
//! use std::sync::Arc;
//! use yafin::{Frequency, Ticker, YahooConnector};
//!
//! let connector = Arc::new(YahooConnector::new().unwrap());
//! let apple = Ticker::with_connector("AAPL", connector.clone()).unwrap();
//! let meta = Ticker::with_connector("META", connector).unwrap();
//! tokio_test::block_on(async {
//!     let profile = apple.asset_profile().await.unwrap();
//!     let income = meta.income_statement(Frequency::Quarterly, None, None).await.unwrap();
//!     println!("{profile}\n{income}");
//!     apple.close().await;
//!     // the transport is closed once the last ticker lets go of it
//!     meta.close().await;
//! });
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod async_impl;
mod chart;
pub mod consts;
mod envelope;
mod ticker;
mod transport;
mod validation;
mod yahoo_error;

pub use chart::{
    decimal::*, CapitalGain, Dividend, Quote, Split, YAdjCloseColumn, YChartData, YChartEvents,
    YMetaData, YQuoteColumns, YQuoteIndicators,
};
pub use envelope::YErrorMessage;
pub use ticker::Ticker;
pub use transport::{HttpResponse, ReqwestTransport, Transport};
pub use validation::{compile_url, frequency_fields, is_valid_type, Frequency, StatementType};
pub use yahoo_error::YahooError;

/// Query parameters of one request. Keys are unique, the last assignment wins.
pub type Params = BTreeMap<String, String>;

pub const YAHOO_BASE_URL: &str = "https://query2.finance.yahoo.com";
pub const YAHOO_NEWS_URL: &str = "https://finance.yahoo.com/xhr/ncp";
pub const YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Sent with every request.
pub const DEFAULT_PARAMS: [(&str, &str); 4] = [
    ("formatted", "false"),
    ("region", "US"),
    ("lang", "en-US"),
    ("corsDomain", "finance.yahoo.com"),
];

const YCRUMB_PATH: &str = "/v1/test/getcrumb";
const YQUOTE_PATH: &str = "/v7/finance/quote";
const YSEARCH_PATH: &str = "/v1/finance/search";
const YINSIGHTS_PATH: &str = "/ws/insights/v2/finance/insights";
const YMARKET_SUMMARY_PATH: &str = "/v6/finance/quote/marketSummary";
const YTRENDING_PATH: &str = "/v1/finance/trending/US";
const YCURRENCIES_PATH: &str = "/v1/finance/currencies";

// Macros instead of constants, so that format! sees a literal
macro_rules! YCHART_PATH {
    () => {
        "{url}/v8/finance/chart/{symbol}"
    };
}
macro_rules! YQUOTE_SUMMARY_PATH {
    () => {
        "{url}/v10/finance/quoteSummary/{symbol}"
    };
}
macro_rules! YTIMESERIES_PATH {
    () => {
        "{url}/ws/fundamentals-timeseries/v1/finance/timeseries/{symbol}"
    };
}
macro_rules! YOPTIONS_PATH {
    () => {
        "{url}/v7/finance/options/{symbol}"
    };
}
macro_rules! YRECOMMENDATIONS_PATH {
    () => {
        "{url}/v6/finance/recommendationsbysymbol/{symbol}"
    };
}
pub(crate) use YCHART_PATH;
pub(crate) use YOPTIONS_PATH;
pub(crate) use YQUOTE_SUMMARY_PATH;
pub(crate) use YRECOMMENDATIONS_PATH;
pub(crate) use YTIMESERIES_PATH;

/// Merge endpoint specific parameters over [`DEFAULT_PARAMS`].
pub fn build_params<K, V, I>(extra: I) -> Params
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut params: Params = DEFAULT_PARAMS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.extend(extra.into_iter().map(|(k, v)| (k.into(), v.into())));
    params
}

/// Container for connection parameters to yahoo! finance server
///
/// The connector is safe to share between tasks (wrap it in an [`Arc`]). The
/// transport is opened on first use; [`YahooConnector::close`] releases it and
/// forgets the crumb, and dropping the connector releases it as well.
pub struct YahooConnector {
    transport: Arc<dyn Transport>,
    base_url: String,
    news_url: String,
    cookie_url: Option<String>,
    crumb: Mutex<Option<String>>,
    /// Bumped on every close, a handshake started before is not cached.
    session: AtomicU64,
}

impl fmt::Debug for YahooConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YahooConnector")
            .field("base_url", &self.base_url)
            .field("news_url", &self.news_url)
            .field("cookie_url", &self.cookie_url)
            .finish_non_exhaustive()
    }
}

impl YahooConnector {
    /// Constructor for a new instance of the yahoo connector with default settings.
    pub fn new() -> Result<YahooConnector, YahooError> {
        Self::builder().build()
    }

    pub fn builder() -> YahooConnectorBuilder {
        YahooConnectorBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Default)]
pub struct YahooConnectorBuilder {
    base_url: Option<String>,
    news_url: Option<String>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    cookie_url: Option<Option<String>>,
    transport: Option<Arc<dyn Transport>>,
}

impl YahooConnectorBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn news_url(mut self, url: impl Into<String>) -> Self {
        self.news_url = Some(url.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Page visited once before the crumb handshake to obtain the session
    /// cookie. `None` skips that step.
    pub fn cookie_url(mut self, url: Option<String>) -> Self {
        self.cookie_url = Some(url);
        self
    }

    /// Replace the reqwest based transport. `user_agent` and `timeout` are
    /// ignored in that case.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<YahooConnector, YahooError> {
        let base_url = checked_url(self.base_url.as_deref().unwrap_or(YAHOO_BASE_URL))?;
        let news_url = checked_url(self.news_url.as_deref().unwrap_or(YAHOO_NEWS_URL))?;
        let cookie_url = match self.cookie_url {
            Some(Some(url)) => Some(checked_url(&url)?),
            Some(None) => None,
            None => Some(YAHOO_COOKIE_URL.to_string()),
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT),
                self.timeout,
            )?),
        };

        Ok(YahooConnector {
            transport,
            base_url,
            news_url,
            cookie_url,
            crumb: Mutex::new(None),
            session: AtomicU64::new(0),
        })
    }
}

fn checked_url(url: &str) -> Result<String, YahooError> {
    reqwest::Url::parse(url).map_err(|e| YahooError::BuilderFailed(format!("{url}: {e}")))?;
    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_params_defaults() {
        let params = build_params(Vec::<(String, String)>::new());
        assert_eq!(params.len(), 4);
        assert_eq!(params["formatted"], "false");
        assert_eq!(params["region"], "US");
        assert_eq!(params["lang"], "en-US");
        assert_eq!(params["corsDomain"], "finance.yahoo.com");
    }

    #[test]
    fn test_build_params_overlay_wins() {
        let params = build_params([("region", "DE"), ("symbols", "SAP.DE")]);
        assert_eq!(params.len(), 5);
        assert_eq!(params["region"], "DE");
        assert_eq!(params["symbols"], "SAP.DE");
        assert_eq!(params["lang"], "en-US");
    }

    #[test]
    fn test_builder_defaults() {
        let provider = YahooConnector::new().unwrap();
        assert_eq!(provider.base_url(), YAHOO_BASE_URL);
        assert_eq!(provider.cookie_url.as_deref(), Some(YAHOO_COOKIE_URL));
        assert_eq!(provider.news_url, YAHOO_NEWS_URL);
    }

    #[test]
    fn test_builder_rejects_bad_input() {
        let err = YahooConnector::builder()
            .base_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, YahooError::BuilderFailed(_)));

        let err = YahooConnector::builder()
            .user_agent("bad\nagent")
            .build()
            .unwrap_err();
        assert!(matches!(err, YahooError::BuilderFailed(_)));
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let provider = YahooConnector::builder()
            .base_url("https://query1.finance.yahoo.com/")
            .cookie_url(None)
            .build()
            .unwrap();
        assert_eq!(provider.base_url(), "https://query1.finance.yahoo.com");
        assert_eq!(provider.cookie_url, None);
    }
}
