//! Finnhub REST Reference Source
//!
//! Previous close from `/quote`, display symbol from `/stock/profile2`.
//! Crypto pairs (`EXCHANGE:PAIR`) skip the profile call and display the
//! pair part.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{ReferenceSource, ReferenceSourceError};
use crate::domain::reference::{InstrumentType, ReferenceEntry};
use crate::domain::subscription::Symbol;
use crate::infrastructure::config::ApiKey;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `/quote` response. Unknown symbols come back as all zeros.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Previous close.
    #[serde(default)]
    pc: Option<f64>,
    /// As-of time, epoch seconds.
    #[serde(default)]
    t: Option<i64>,
}

/// `/stock/profile2` response. Unknown symbols come back as `{}`.
#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    ticker: Option<String>,
}

/// HTTP reference source backed by the Finnhub REST API.
#[derive(Debug, Clone)]
pub struct FinnhubReferenceSource {
    client: Client,
    base_url: String,
    api_key: ApiKey,
}

impl FinnhubReferenceSource {
    /// Create a source for `base_url` (e.g. `https://finnhub.io/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: ApiKey) -> Result<Self, ReferenceSourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReferenceSourceError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T, ReferenceSourceError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("token", self.api_key.expose())])
            .send()
            .await
            .map_err(|e| ReferenceSourceError::Transport {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ReferenceSourceError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ReferenceSourceError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ReferenceSourceError::Transport {
                message: e.without_url().to_string(),
            })?;
        serde_json::from_slice(&body).map_err(|e| ReferenceSourceError::Malformed {
            message: format!("{path}: {e}"),
        })
    }

    /// Display symbol from the company profile, falling back to the symbol.
    ///
    /// Only a rate limit is surfaced; any other profile failure keeps the
    /// quote usable.
    async fn display_symbol(&self, symbol: &Symbol) -> Result<String, ReferenceSourceError> {
        match self.get::<ProfileResponse>("/stock/profile2", symbol.as_str()).await {
            Ok(profile) => Ok(profile
                .ticker
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| symbol.to_string())),
            Err(e) if e.is_rate_limited() => Err(e),
            Err(e) => {
                tracing::debug!(symbol = %symbol, error = %e, "Profile lookup failed, using symbol");
                Ok(symbol.to_string())
            }
        }
    }
}

#[async_trait]
impl ReferenceSource for FinnhubReferenceSource {
    async fn fetch(&self, symbol: &Symbol) -> Result<ReferenceEntry, ReferenceSourceError> {
        let quote: QuoteResponse = self.get("/quote", symbol.as_str()).await?;

        let previous_close = quote
            .pc
            .filter(|pc| pc.is_finite() && *pc > 0.0)
            .ok_or_else(|| ReferenceSourceError::NotFound {
                symbol: symbol.to_string(),
            })?;

        let as_of = quote
            .t
            .filter(|t| *t > 0)
            .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
            .unwrap_or_else(Utc::now);

        let instrument_type = InstrumentType::of(symbol);
        let display_symbol = match instrument_type {
            InstrumentType::Crypto => symbol.local_part().to_string(),
            InstrumentType::Stock => self.display_symbol(symbol).await?,
        };

        Ok(ReferenceEntry {
            symbol: symbol.clone(),
            previous_close,
            as_of,
            display_symbol,
            instrument_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    async fn source(server: &MockServer) -> FinnhubReferenceSource {
        FinnhubReferenceSource::new(server.uri(), ApiKey::new("test-key")).unwrap()
    }

    #[tokio::test]
    async fn stock_quote_and_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("symbol", "AAPL"))
            .and(query_param("token", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 101.5, "d": 1.5, "dp": 1.5, "h": 102.0, "l": 99.0, "o": 100.0,
                "pc": 100.0, "t": 1_700_000_000
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stock/profile2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ticker": "AAPL", "name": "Apple Inc"})),
            )
            .mount(&server)
            .await;

        let entry = source(&server).await.fetch(&sym("AAPL")).await.unwrap();

        assert_eq!(entry.previous_close, 100.0);
        assert_eq!(entry.display_symbol, "AAPL");
        assert_eq!(entry.instrument_type, InstrumentType::Stock);
        assert_eq!(entry.as_of.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn crypto_skips_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"c": 1.0, "pc": 42000.0, "t": 0})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stock/profile2"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let entry = source(&server)
            .await
            .fetch(&sym("BINANCE:BTCUSDT"))
            .await
            .unwrap();

        assert_eq!(entry.display_symbol, "BTCUSDT");
        assert_eq!(entry.instrument_type, InstrumentType::Crypto);
    }

    #[tokio::test]
    async fn empty_profile_falls_back_to_symbol() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pc": 10.0, "t": 1})))
            .mount(&server)
            .await;
        Mock::given(path("/stock/profile2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let entry = source(&server).await.fetch(&sym("SPY")).await.unwrap();
        assert_eq!(entry.display_symbol, "SPY");
    }

    #[tokio::test]
    async fn zero_previous_close_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0, "t": 0
            })))
            .mount(&server)
            .await;

        let err = source(&server).await.fetch(&sym("NOPE")).await.unwrap_err();
        assert_eq!(err, ReferenceSourceError::NotFound { symbol: "NOPE".into() });
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = source(&server).await.fetch(&sym("AAPL")).await.unwrap_err();
        assert_eq!(
            err,
            ReferenceSourceError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_http() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = source(&server).await.fetch(&sym("AAPL")).await.unwrap_err();
        assert_eq!(
            err,
            ReferenceSourceError::Http {
                status: 502,
                message: "bad gateway".into()
            }
        );
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = source(&server).await.fetch(&sym("AAPL")).await.unwrap_err();
        assert!(matches!(err, ReferenceSourceError::Malformed { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport() {
        let source = FinnhubReferenceSource::new("http://127.0.0.1:1", ApiKey::new("k")).unwrap();
        let err = source.fetch(&sym("AAPL")).await.unwrap_err();
        assert!(matches!(err, ReferenceSourceError::Transport { .. }));
    }
}
