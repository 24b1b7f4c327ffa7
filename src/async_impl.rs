use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use serde_json::{json, Value};
use time::OffsetDateTime;

use super::*;
use crate::consts::ALL_MODULES;
use crate::envelope::Envelope;
use crate::validation::{
    check_events, check_interval, check_list, check_range, check_ticker, compile_url, invalid,
    is_valid_type, resolve_period,
};

impl YahooConnector {
    /// Open the transport now instead of on the first request.
    pub async fn open(&self) -> Result<(), YahooError> {
        self.transport.open().await
    }

    /// Release the transport and forget the crumb. The connector stays usable,
    /// the next request opens a fresh session.
    pub async fn close(&self) {
        self.transport.close().await;
        self.forget_crumb();
    }

    /// Run `f` inside an opened session that is closed afterwards, whether `f`
    /// succeeded, failed or was dropped before completion.
    pub async fn with_session<'a, F, Fut, T>(&'a self, f: F) -> Result<T, YahooError>
    where
        F: FnOnce(&'a YahooConnector) -> Fut,
        Fut: Future<Output = Result<T, YahooError>>,
    {
        let _session = SessionGuard(self);
        self.open().await?;
        f(self).await
    }

    fn forget_crumb(&self) {
        let mut crumb = self.crumb.lock().unwrap_or_else(PoisonError::into_inner);
        *crumb = None;
        self.session.fetch_add(1, Ordering::SeqCst);
    }

    /// Send a GET request and parse the body as JSON. The envelope is left as is.
    pub async fn fetch(&self, url: &str, params: &Params) -> Result<Value, YahooError> {
        log::debug!("GET {}", compile_url(url, params));
        let resp = self.transport.get(url, params).await?;
        parse_json(url, resp)
    }

    async fn fetch_post(
        &self,
        url: &str,
        params: &Params,
        body: &Value,
    ) -> Result<Value, YahooError> {
        log::debug!("POST {} {body}", compile_url(url, params));
        let resp = self.transport.post_json(url, params, body).await?;
        parse_json(url, resp)
    }

    /// The crumb of the current session, fetched on first use.
    ///
    /// Concurrent first calls may each run the handshake; the last one to
    /// finish is kept. A handshake overtaken by [`YahooConnector::close`] still
    /// returns its crumb but does not cache it. A rejected crumb is not
    /// refreshed automatically, call [`YahooConnector::close`] to start over.
    pub async fn get_auth_token(&self) -> Result<String, YahooError> {
        if let Some(crumb) = self.cached_crumb() {
            return Ok(crumb);
        }
        let session = self.session.load(Ordering::SeqCst);

        log::debug!("fetching crumb");
        if let Some(cookie_url) = &self.cookie_url {
            // only the cookie matters, yahoo! answers this page with 404
            let resp = self.transport.get(cookie_url, &Params::new()).await?;
            log::debug!("cookie page answered {}", resp.status);
        }

        let url = format!("{}{YCRUMB_PATH}", self.base_url);
        log::debug!("GET {url}");
        let resp = check_status(&url, self.transport.get(&url, &Params::new()).await?)?;
        let crumb = resp.body.trim().to_string();
        if crumb.is_empty() {
            log::error!("empty crumb from {url}");
            return Err(YahooError::InvalidCrumb);
        }

        let mut cached = self.crumb.lock().unwrap_or_else(PoisonError::into_inner);
        if self.session.load(Ordering::SeqCst) == session {
            *cached = Some(crumb.clone());
        } else {
            log::debug!("session closed during handshake, crumb not cached");
        }
        Ok(crumb)
    }

    fn cached_crumb(&self) -> Option<String> {
        self.crumb
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Retrieve the chart (OHLCV history and events) of `ticker` for a range
    /// like `1mo` in bars of `interval` like `1d`.
    ///
    /// `events` is a comma separated subset of `div,split`; `None` requests no
    /// events.
    pub async fn get_chart(
        &self,
        ticker: &str,
        range: &str,
        interval: &str,
        events: Option<&str>,
    ) -> Result<Value, YahooError> {
        log::debug!("get_chart({ticker}, {range}, {interval}, {events:?})");
        let ticker = check_ticker(ticker)?;
        let range = check_range(range)?;
        let interval = check_interval(interval)?;
        let events = events.map(check_events).transpose()?;

        let url = format!(YCHART_PATH!(), url = self.base_url, symbol = ticker);
        let mut params = build_params([("range", range), ("interval", interval)]);
        if let Some(events) = events {
            params.insert("events".to_string(), events);
        }
        Envelope::FirstResult("chart").unwrap(self.fetch(&url, &params).await?)
    }

    /// Retrieve quotes for one or more tickers. Returns the list of quotes.
    pub async fn get_quote<S: AsRef<str>>(&self, tickers: &[S]) -> Result<Value, YahooError> {
        let tickers = check_list("tickers", tickers, |t| !t.is_empty())?;
        log::debug!("get_quote({tickers:?})");

        let crumb = self.get_auth_token().await?;
        let url = format!("{}{YQUOTE_PATH}", self.base_url);
        let params = build_params([("symbols", tickers.join(",")), ("crumb", crumb)]);
        Envelope::Results("quoteResponse").unwrap(self.fetch(&url, &params).await?)
    }

    /// Retrieve the given quote summary modules (see
    /// [`ALL_MODULES`](crate::consts::ALL_MODULES)) of `ticker`. The result maps
    /// module names to their content.
    pub async fn get_quote_summary<S: AsRef<str>>(
        &self,
        ticker: &str,
        modules: &[S],
    ) -> Result<Value, YahooError> {
        let ticker = check_ticker(ticker)?;
        let modules = check_list("modules", modules, |m| ALL_MODULES.contains(&m))?;
        log::debug!("get_quote_summary({ticker}, {modules:?})");

        let crumb = self.get_auth_token().await?;
        let url = format!(YQUOTE_SUMMARY_PATH!(), url = self.base_url, symbol = ticker);
        let params = build_params([("modules", modules.join(",")), ("crumb", crumb)]);
        Envelope::FirstResult("quoteSummary").unwrap(self.fetch(&url, &params).await?)
    }

    /// Retrieve fundamentals timeseries of `ticker`. `types` are frequency
    /// prefixed field names such as `annualTotalRevenue`, see
    /// [`frequency_fields`]. Missing bounds default to 2020-01-01 and now.
    ///
    /// Returns the list of series objects, one per type that has data.
    pub async fn get_timeseries<S: AsRef<str>>(
        &self,
        ticker: &str,
        types: &[S],
        period1: Option<f64>,
        period2: Option<f64>,
    ) -> Result<Value, YahooError> {
        let ticker = check_ticker(ticker)?;
        let types = check_list("types", types, is_valid_type)?;
        let (period1, period2) = resolve_period(period1, period2, OffsetDateTime::now_utc())?;
        log::debug!(
            "get_timeseries({ticker}, {} types, {period1}, {period2})",
            types.len()
        );

        let url = format!(YTIMESERIES_PATH!(), url = self.base_url, symbol = ticker);
        let params = build_params([
            ("type", types.join(",")),
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
        ]);
        Envelope::Results("timeseries").unwrap(self.fetch(&url, &params).await?)
    }

    /// Retrieve the option chain of `ticker`.
    pub async fn get_options(&self, ticker: &str) -> Result<Value, YahooError> {
        let ticker = check_ticker(ticker)?;
        log::debug!("get_options({ticker})");

        let crumb = self.get_auth_token().await?;
        let url = format!(YOPTIONS_PATH!(), url = self.base_url, symbol = ticker);
        let params = build_params([("crumb", crumb)]);
        Envelope::FirstResult("optionChain").unwrap(self.fetch(&url, &params).await?)
    }

    /// Search quotes and news matching `query`. The whole response is returned.
    pub async fn get_search(&self, query: &str) -> Result<Value, YahooError> {
        let query = check_ticker(query)?;
        log::debug!("get_search({query})");

        let url = format!("{}{YSEARCH_PATH}", self.base_url);
        let params = build_params([("q", query)]);
        Envelope::Direct.unwrap(self.fetch(&url, &params).await?)
    }

    /// Retrieve symbols recommended alongside `ticker`.
    pub async fn get_recommendations(&self, ticker: &str) -> Result<Value, YahooError> {
        let ticker = check_ticker(ticker)?;
        log::debug!("get_recommendations({ticker})");

        let url = format!(YRECOMMENDATIONS_PATH!(), url = self.base_url, symbol = ticker);
        let body = self.fetch(&url, &build_params(Params::new())).await?;
        Envelope::FirstResult("finance").unwrap(body)
    }

    /// Retrieve technical and research insights for `ticker`.
    pub async fn get_insights(&self, ticker: &str) -> Result<Value, YahooError> {
        let ticker = check_ticker(ticker)?;
        log::debug!("get_insights({ticker})");

        let url = format!("{}{YINSIGHTS_PATH}", self.base_url);
        let params = build_params([("symbol", ticker)]);
        Envelope::Results("finance").unwrap(self.fetch(&url, &params).await?)
    }

    /// Retrieve the summaries of the major markets.
    pub async fn get_market_summaries(&self) -> Result<Value, YahooError> {
        log::debug!("get_market_summaries()");
        let url = format!("{}{YMARKET_SUMMARY_PATH}", self.base_url);
        let body = self.fetch(&url, &build_params(Params::new())).await?;
        Envelope::Results("marketSummaryResponse").unwrap(body)
    }

    /// Retrieve the trending tickers of the US market.
    pub async fn get_trending(&self) -> Result<Value, YahooError> {
        log::debug!("get_trending()");
        let url = format!("{}{YTRENDING_PATH}", self.base_url);
        let body = self.fetch(&url, &build_params(Params::new())).await?;
        Envelope::FirstResult("finance").unwrap(body)
    }

    /// Retrieve the list of currencies.
    pub async fn get_currencies(&self) -> Result<Value, YahooError> {
        log::debug!("get_currencies()");
        let url = format!("{}{YCURRENCIES_PATH}", self.base_url);
        let body = self.fetch(&url, &build_params(Params::new())).await?;
        Envelope::Results("currencies").unwrap(body)
    }

    /// Retrieve up to `count` latest news items about `ticker`.
    pub async fn get_news(&self, ticker: &str, count: u32) -> Result<Value, YahooError> {
        let ticker = check_ticker(ticker)?;
        if count == 0 {
            return Err(invalid("news count must be positive".to_string()));
        }
        log::debug!("get_news({ticker}, {count})");

        let params = build_params([("queryRef", "latestNews"), ("serviceKey", "ncp_fin")]);
        let body = json!({"serviceConfig": {"snippetCount": count, "s": [ticker]}});
        Envelope::Path(&["data", "tickerStream", "stream"])
            .unwrap(self.fetch_post(&self.news_url, &params, &body).await?)
    }
}

/// Releases the transport when a session ends, including when its future is
/// dropped.
struct SessionGuard<'a>(&'a YahooConnector);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.transport.release();
        self.0.forget_crumb();
    }
}

fn check_status(url: &str, resp: HttpResponse) -> Result<HttpResponse, YahooError> {
    if resp.is_success() {
        return Ok(resp);
    }
    log::error!("HTTP error: {} for {url}", resp.status);
    let message = match resp.body.trim() {
        "" => reqwest::StatusCode::from_u16(resp.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unknown status")
            .to_string(),
        body => body.to_string(),
    };
    Err(YahooError::FetchFailed {
        status: resp.status,
        message,
    })
}

fn parse_json(url: &str, resp: HttpResponse) -> Result<Value, YahooError> {
    let resp = check_status(url, resp)?;
    serde_json::from_str(&resp.body).map_err(|e| {
        log::error!("invalid JSON from {url}: {e}");
        YahooError::DeserializeFailed(e)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::transport::mock::{connector, MockTransport};

    const CRUMB: &str = "/v1/test/getcrumb";
    const CHART: &str = "/v8/finance/chart/AAPL";
    const QUOTE: &str = "/v7/finance/quote";
    const SUMMARY: &str = "/v10/finance/quoteSummary/AAPL";
    const TIMESERIES: &str = "/ws/fundamentals-timeseries/v1/finance/timeseries/AAPL";

    fn chart_fixture() -> Value {
        json!({"chart": {"result": [{
            "meta": {"symbol": "AAPL", "currency": "USD", "dataGranularity": "1d", "range": "1d"},
            "timestamp": [1, 2, 3],
            "indicators": {"quote": [{
                "open": [1.0, 2.0, 3.0],
                "high": [1.5, 2.5, 3.5],
                "low": [0.5, 1.5, 2.5],
                "close": [1.2, 2.2, 3.2],
                "volume": [100, 200, 300]
            }]}
        }], "error": null}})
    }

    fn setup() -> (Arc<MockTransport>, YahooConnector) {
        let mock = MockTransport::new();
        mock.route(CRUMB, 200, "crumb-123");
        let provider = connector(&mock);
        (mock, provider)
    }

    #[test]
    fn test_get_chart() {
        let (mock, provider) = setup();
        mock.route_json(CHART, chart_fixture());

        let chart =
            tokio_test::block_on(provider.get_chart("AAPL", "1d", "1d", Some("div,split"))).unwrap();
        assert_eq!(chart["meta"]["symbol"], "AAPL");
        assert_eq!(chart["indicators"]["quote"][0]["open"].as_array().unwrap().len(), 3);

        let request = mock.last(CHART).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.params["range"], "1d");
        assert_eq!(request.params["interval"], "1d");
        assert_eq!(request.params["events"], "div,split");
        assert_eq!(request.params["formatted"], "false");
        assert!(!request.params.contains_key("crumb"));
        assert_eq!(mock.calls(CRUMB), 0);
    }

    #[test]
    fn test_get_chart_exact_unwrap() {
        let (mock, provider) = setup();
        mock.route_json(
            CHART,
            json!({"chart": {"result": [{"meta": {"symbol": "AAPL"}}], "error": null}}),
        );
        let chart = tokio_test::block_on(provider.get_chart("AAPL", "5d", "1h", None)).unwrap();
        assert_eq!(chart, json!({"meta": {"symbol": "AAPL"}}));
        assert!(!mock.last(CHART).unwrap().params.contains_key("events"));
    }

    #[test]
    fn test_get_chart_api_error() {
        let (mock, provider) = setup();
        mock.route_json(
            CHART,
            json!({"chart": {"result": null, "error": {"code": "Not Found", "description": "x"}}}),
        );
        let err = tokio_test::block_on(provider.get_chart("AAPL", "1d", "1d", None)).unwrap_err();
        assert!(matches!(err, YahooError::ApiError(_)));
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_validation_is_pre_network() {
        let (mock, provider) = setup();
        let empty: [&str; 0] = [];

        for range in ["invalid", "2h", "15y", "1w", "", "2d"] {
            let resp = tokio_test::block_on(provider.get_chart("AAPL", range, "1d", None));
            assert!(matches!(resp, Err(YahooError::InvalidParameter(_))), "{range}");
        }
        for interval in ["invalid", "2m", "45m", "2h", "", "3d"] {
            let resp = tokio_test::block_on(provider.get_chart("AAPL", "1d", interval, None));
            assert!(matches!(resp, Err(YahooError::InvalidParameter(_))), "{interval}");
        }
        for events in ["invalid", "earnings", "div,earnings", "", "badEvent"] {
            let resp = tokio_test::block_on(provider.get_chart("AAPL", "1d", "1d", Some(events)));
            assert!(matches!(resp, Err(YahooError::InvalidParameter(_))), "{events}");
        }
        for module in ["invalid", "nonexistent", "badModule", "", "fakeModule"] {
            let resp = tokio_test::block_on(provider.get_quote_summary("AAPL", &[module]));
            assert!(matches!(resp, Err(YahooError::InvalidParameter(_))), "{module}");
        }
        for types in ["TotalRevenue", "trailingTotalAssets", "annualTotalRevenue,bogus"] {
            let resp = tokio_test::block_on(provider.get_timeseries("AAPL", &[types], None, None));
            assert!(matches!(resp, Err(YahooError::InvalidParameter(_))), "{types}");
        }
        assert!(tokio_test::block_on(provider.get_quote(&empty)).is_err());
        assert!(tokio_test::block_on(provider.get_options(" ")).is_err());
        assert!(tokio_test::block_on(provider.get_news("AAPL", 0)).is_err());

        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_crumb_is_cached() {
        let (mock, provider) = setup();
        mock.route_json(QUOTE, json!({"quoteResponse": {"result": [{"symbol": "AAPL"}], "error": null}}));

        tokio_test::block_on(provider.get_quote(&["AAPL"])).unwrap();
        tokio_test::block_on(provider.get_quote(&["AAPL"])).unwrap();

        assert_eq!(mock.calls(CRUMB), 1);
        assert_eq!(mock.calls(QUOTE), 2);
        assert_eq!(mock.last(QUOTE).unwrap().params["crumb"], "crumb-123");
    }

    #[test]
    fn test_close_forgets_crumb() {
        let (mock, provider) = setup();
        assert_eq!(tokio_test::block_on(provider.get_auth_token()).unwrap(), "crumb-123");

        tokio_test::block_on(provider.close());
        assert_eq!(mock.closed(), 1);

        mock.route(CRUMB, 200, "crumb-456\n");
        assert_eq!(tokio_test::block_on(provider.get_auth_token()).unwrap(), "crumb-456");
        assert_eq!(mock.calls(CRUMB), 2);
    }

    #[test]
    fn test_crumb_failures() {
        let (mock, provider) = setup();
        mock.route(CRUMB, 429, "Too Many Requests");
        let err = tokio_test::block_on(provider.get_auth_token()).unwrap_err();
        assert!(err.is_http());
        assert_eq!(err.status(), Some(429));

        mock.route(CRUMB, 200, "  ");
        let err = tokio_test::block_on(provider.get_auth_token()).unwrap_err();
        assert!(matches!(err, YahooError::InvalidCrumb));

        // a failed handshake stops the request that needed it
        assert!(tokio_test::block_on(provider.get_options("AAPL")).is_err());
        assert_eq!(mock.calls("/v7/finance/options/AAPL"), 0);
    }

    #[test]
    fn test_cookie_page_visited_before_crumb() {
        let mock = MockTransport::new();
        mock.route(CRUMB, 200, "crumb-123");
        let provider = YahooConnector::builder()
            .base_url("https://mock.test")
            .cookie_url(Some("https://cookie.mock.test/".to_string()))
            .transport(mock.clone())
            .build()
            .unwrap();

        tokio_test::block_on(provider.get_auth_token()).unwrap();
        tokio_test::block_on(provider.get_auth_token()).unwrap();

        let paths: Vec<String> = mock.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/".to_string(), CRUMB.to_string()]);
    }

    #[test]
    fn test_http_and_parse_errors() {
        let (mock, provider) = setup();
        mock.route(CHART, 500, "");
        match tokio_test::block_on(provider.get_chart("AAPL", "1d", "1d", None)) {
            Err(YahooError::FetchFailed { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected {other:?}"),
        }

        mock.route(CHART, 200, "<html>not json</html>");
        assert!(matches!(
            tokio_test::block_on(provider.get_chart("AAPL", "1d", "1d", None)),
            Err(YahooError::DeserializeFailed(_))
        ));
        assert_eq!(mock.calls(CHART), 2);
    }

    #[test]
    fn test_get_quote_summary() {
        let (mock, provider) = setup();
        mock.route_json(
            SUMMARY,
            json!({"quoteSummary": {"result": [{"price": {"regularMarketPrice": 1.0}, "assetProfile": {}}], "error": null}}),
        );
        let summary = tokio_test::block_on(
            provider.get_quote_summary("AAPL", &["price,assetProfile", "price"]),
        )
        .unwrap();
        assert_eq!(summary["price"]["regularMarketPrice"], 1.0);

        let params = mock.last(SUMMARY).unwrap().params;
        assert_eq!(params["modules"], "price,assetProfile");
        assert_eq!(params["crumb"], "crumb-123");
    }

    #[test]
    fn test_get_timeseries_default_window() {
        let (mock, provider) = setup();
        mock.route_json(
            TIMESERIES,
            json!({"timeseries": {"result": [{"meta": {"type": ["annualTotalRevenue"]}, "annualTotalRevenue": []}], "error": null}}),
        );

        let before = OffsetDateTime::now_utc().unix_timestamp();
        let series = tokio_test::block_on(provider.get_timeseries(
            "AAPL",
            &["annualTotalRevenue", "annualNetIncome"],
            None,
            None,
        ))
        .unwrap();
        let after = OffsetDateTime::now_utc().unix_timestamp();
        assert!(series.is_array());

        let params = mock.last(TIMESERIES).unwrap().params;
        assert_eq!(params["type"], "annualTotalRevenue,annualNetIncome");
        assert_eq!(
            params["period1"],
            datetime!(2020-01-01 0:00 UTC).unix_timestamp().to_string()
        );
        let period2: i64 = params["period2"].parse().unwrap();
        assert!(before <= period2 && period2 <= after);
        assert!(!params.contains_key("crumb"));
    }

    #[test]
    fn test_get_timeseries_truncates_bounds() {
        let (mock, provider) = setup();
        mock.route_json(TIMESERIES, json!({"timeseries": {"result": [], "error": null}}));

        tokio_test::block_on(provider.get_timeseries(
            "AAPL",
            &["quarterlyFreeCashFlow"],
            Some(1_609_459_200.999),
            Some(1_640_995_199.5),
        ))
        .unwrap();

        let params = mock.last(TIMESERIES).unwrap().params;
        assert_eq!(params["period1"], "1609459200");
        assert_eq!(params["period2"], "1640995199");
    }

    #[test]
    fn test_unwrap_depth_per_endpoint() {
        let (mock, provider) = setup();
        mock.route_json(
            "/v7/finance/options/AAPL",
            json!({"optionChain": {"result": [{"underlyingSymbol": "AAPL"}], "error": null}}),
        );
        mock.route_json(
            "/v1/finance/search",
            json!({"count": 1, "quotes": [{"symbol": "AAPL"}], "news": []}),
        );
        mock.route_json(
            "/v6/finance/recommendationsbysymbol/AAPL",
            json!({"finance": {"result": [{"symbol": "AAPL", "recommendedSymbols": []}], "error": null}}),
        );
        mock.route_json(
            "/ws/insights/v2/finance/insights",
            json!({"finance": {"result": {"symbol": "AAPL"}, "error": null}}),
        );
        mock.route_json(
            "/v6/finance/quote/marketSummary",
            json!({"marketSummaryResponse": {"result": [{"symbol": "^GSPC"}, {"symbol": "^DJI"}], "error": null}}),
        );
        mock.route_json(
            "/v1/finance/trending/US",
            json!({"finance": {"result": [{"count": 1, "quotes": [{"symbol": "NVDA"}]}], "error": null}}),
        );
        mock.route_json(
            "/v1/finance/currencies",
            json!({"currencies": {"result": [{"symbol": "USD"}, {"symbol": "EUR"}], "error": null}}),
        );

        let options = tokio_test::block_on(provider.get_options("AAPL")).unwrap();
        assert_eq!(options, json!({"underlyingSymbol": "AAPL"}));

        let search = tokio_test::block_on(provider.get_search("AAPL")).unwrap();
        assert_eq!(search["count"], 1);
        assert_eq!(mock.last("/v1/finance/search").unwrap().params["q"], "AAPL");

        let recommendations = tokio_test::block_on(provider.get_recommendations("AAPL")).unwrap();
        assert_eq!(recommendations["symbol"], "AAPL");

        let insights = tokio_test::block_on(provider.get_insights("AAPL")).unwrap();
        assert_eq!(insights, json!({"symbol": "AAPL"}));
        assert_eq!(
            mock.last("/ws/insights/v2/finance/insights").unwrap().params["symbol"],
            "AAPL"
        );

        let summaries = tokio_test::block_on(provider.get_market_summaries()).unwrap();
        assert_eq!(summaries.as_array().unwrap().len(), 2);

        let trending = tokio_test::block_on(provider.get_trending()).unwrap();
        assert_eq!(trending["quotes"][0]["symbol"], "NVDA");

        let currencies = tokio_test::block_on(provider.get_currencies()).unwrap();
        assert_eq!(currencies[1]["symbol"], "EUR");

        // only the options request needs a crumb
        assert_eq!(mock.calls(CRUMB), 1);
        assert_eq!(mock.requests().len(), 8);
        for request in mock.requests().into_iter().filter(|r| r.path != CRUMB) {
            assert_eq!(request.params["region"], "US");
            assert_eq!(request.params["lang"], "en-US");
        }
    }

    #[test]
    fn test_get_news_posts_json() {
        let (mock, provider) = setup();
        mock.route_json(
            "/xhr/ncp",
            json!({"data": {"tickerStream": {"stream": [{"id": "a"}, {"id": "b"}]}}}),
        );

        let news = tokio_test::block_on(provider.get_news("AAPL", 5)).unwrap();
        assert_eq!(news.as_array().unwrap().len(), 2);

        let request = mock.last("/xhr/ncp").unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.params["queryRef"], "latestNews");
        assert_eq!(request.params["serviceKey"], "ncp_fin");
        assert_eq!(
            request.body.unwrap(),
            json!({"serviceConfig": {"snippetCount": 5, "s": ["AAPL"]}})
        );
        assert_eq!(mock.calls(CRUMB), 0);
    }

    #[test]
    fn test_with_session_closes_on_error() {
        let (mock, provider) = setup();
        let result: Result<Value, YahooError> = tokio_test::block_on(
            provider.with_session(|p| async move { p.get_chart("AAPL", "1d", "1d", None).await }),
        );
        assert!(result.is_err());
        assert_eq!(mock.closed(), 1);

        mock.route_json(CHART, chart_fixture());
        let chart = tokio_test::block_on(
            provider.with_session(|p| async move { p.get_chart("AAPL", "1d", "1d", None).await }),
        )
        .unwrap();
        assert_eq!(chart["meta"]["symbol"], "AAPL");
        assert_eq!(mock.closed(), 2);
    }

    #[test]
    fn test_dropped_session_is_closed() {
        let (mock, provider) = setup();
        let mut session = tokio_test::task::spawn(provider.with_session(|p| async move {
            p.get_auth_token().await?;
            std::future::pending::<()>().await;
            Ok::<(), YahooError>(())
        }));
        assert!(session.poll().is_pending());
        assert_eq!(provider.cached_crumb().as_deref(), Some("crumb-123"));
        assert_eq!(mock.closed(), 0);

        drop(session);
        assert_eq!(mock.closed(), 1);
        assert_eq!(provider.cached_crumb(), None);
    }

    #[test]
    fn test_handshake_overtaken_by_close_is_not_cached() {
        let (mock, provider) = setup();
        mock.stall(CRUMB);

        let mut handshake = tokio_test::task::spawn(provider.get_auth_token());
        assert!(handshake.poll().is_pending());
        tokio_test::block_on(provider.close());

        match handshake.poll() {
            std::task::Poll::Ready(Ok(crumb)) => assert_eq!(crumb, "crumb-123"),
            other => panic!("unexpected {other:?}"),
        }
        drop(handshake);
        assert_eq!(provider.cached_crumb(), None);

        // a handshake within the new session is cached again
        tokio_test::block_on(provider.get_auth_token()).unwrap();
        assert_eq!(provider.cached_crumb().as_deref(), Some("crumb-123"));
        assert_eq!(mock.calls(CRUMB), 2);
    }
}
