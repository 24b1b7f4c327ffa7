//! HTTP seam between [`YahooConnector`](crate::YahooConnector) and the network.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde_json::Value;

use crate::{Params, YahooError};

/// Status and body of a completed request. Non-2xx statuses are not errors
/// at this level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues requests on behalf of a connector. Implementations must allow
/// concurrent requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Acquire whatever the transport needs up front.
    async fn open(&self) -> Result<(), YahooError> {
        Ok(())
    }

    async fn get(&self, url: &str, params: &Params) -> Result<HttpResponse, YahooError>;

    async fn post_json(
        &self,
        url: &str,
        params: &Params,
        body: &Value,
    ) -> Result<HttpResponse, YahooError>;

    /// Drop connections without waiting. Also runs when a session future is
    /// dropped mid-flight, so it must not block.
    fn release(&self) {}

    /// Release connections. The transport may be opened again afterwards.
    async fn close(&self) {
        self.release()
    }
}

/// [`Transport`] on top of a `reqwest` client that keeps the cookies yahoo!
/// hands out.
///
/// Only the HTTP headers imitate a desktop browser. The TLS handshake is
/// plain rustls, so a service that checks TLS fingerprints can still tell it
/// apart; plug a fingerprinting client in through [`Transport`] if needed.
#[derive(Debug)]
pub struct ReqwestTransport {
    headers: HeaderMap,
    timeout: Option<Duration>,
    client: Mutex<Option<Client>>,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, YahooError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| YahooError::BuilderFailed(format!("user agent: {e}")))?,
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json,text/plain,*/*"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            header::ORIGIN,
            HeaderValue::from_static("https://finance.yahoo.com"),
        );
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://finance.yahoo.com/"),
        );

        Ok(ReqwestTransport {
            headers,
            timeout,
            client: Mutex::new(None),
        })
    }

    /// The open client, created on first use.
    fn client(&self) -> Result<Client, YahooError> {
        let mut guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .default_headers(self.headers.clone())
            .cookie_store(true);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| YahooError::BuilderFailed(e.to_string()))?;
        log::debug!("opened http client");

        *guard = Some(client.clone());
        Ok(client)
    }

    async fn read(resp: reqwest::Response) -> Result<HttpResponse, YahooError> {
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self) -> Result<(), YahooError> {
        self.client().map(|_| ())
    }

    async fn get(&self, url: &str, params: &Params) -> Result<HttpResponse, YahooError> {
        let resp = self.client()?.get(url).query(params).send().await?;
        Self::read(resp).await
    }

    async fn post_json(
        &self,
        url: &str,
        params: &Params,
        body: &Value,
    ) -> Result<HttpResponse, YahooError> {
        let resp = self
            .client()?
            .post(url)
            .query(params)
            .json(body)
            .send()
            .await?;
        Self::read(resp).await
    }

    fn release(&self) {
        // in-flight requests keep their own handle, the pool goes away with the last one
        if self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            log::debug!("closed http client");
        }
    }
}
