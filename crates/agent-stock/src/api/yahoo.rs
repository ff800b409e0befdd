//! Yahoo Finance price bar source

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use time::OffsetDateTime;
use tracing::{debug, instrument};
use yahoo_finance_api as yahoo;

use crate::bars::{PriceBar, PriceBarSource};
use crate::error::{Result, StockError};

/// Bars are reported in units of 10 000 shares and currency
const UNIT: f64 = 10_000.0;

/// Daily bars from Yahoo Finance
#[derive(Debug, Clone, Default)]
pub struct YahooBarSource {}

impl YahooBarSource {
    /// Create a new Yahoo Finance bar source
    pub fn new() -> Self {
        Self {}
    }

    /// Yahoo ticker of a mainland exchange code
    ///
    /// `6xxxxx`/`9xxxxx` trade in Shanghai (`.SS`), `0xxxxx`/`2xxxxx`/`3xxxxx`
    /// in Shenzhen (`.SZ`) and `4xxxxx`/`8xxxxx` in Beijing (`.BJ`). Anything
    /// else, including symbols that already carry a suffix, is used as is.
    pub fn ticker(subject: &str) -> String {
        if subject.len() != 6 || !subject.chars().all(|c| c.is_ascii_digit()) {
            return subject.to_string();
        }
        let suffix = match subject.as_bytes()[0] {
            b'6' | b'9' => "SS",
            b'0' | b'2' | b'3' => "SZ",
            b'4' | b'8' => "BJ",
            _ => return subject.to_string(),
        };
        format!("{subject}.{suffix}")
    }
}

#[async_trait]
impl PriceBarSource for YahooBarSource {
    #[instrument(skip(self))]
    async fn recent_bars(&self, subject: &str, count: usize) -> Result<Vec<PriceBar>> {
        let ticker = Self::ticker(subject);
        let provider = yahoo::YahooConnector::new()
            .map_err(|e| StockError::YahooFinanceError(e.to_string()))?;

        // Calendar window wide enough to cover `count` trading days
        let end = Utc::now();
        let start = end - Duration::days(count as i64 * 2 + 10);
        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| StockError::YahooFinanceError(format!("Invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| StockError::YahooFinanceError(format!("Invalid end timestamp: {e}")))?;

        let response = provider
            .get_quote_history(&ticker, start_odt, end_odt)
            .await
            .map_err(|e| StockError::YahooFinanceError(e.to_string()))?;
        let quotes = response
            .quotes()
            .map_err(|e| StockError::YahooFinanceError(e.to_string()))?;

        let mut bars: Vec<PriceBar> = quotes
            .iter()
            .filter_map(|q| {
                let trade_date = DateTime::from_timestamp(q.timestamp as i64, 0)?.date_naive();
                let volume = q.volume as f64;
                Some(PriceBar {
                    trade_date,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: volume / UNIT,
                    amount: volume * q.close / UNIT,
                })
            })
            .collect();

        if bars.is_empty() {
            return Err(StockError::DataUnavailable {
                symbol: ticker,
                reason: "no quotes in range".to_string(),
            });
        }

        bars.sort_by_key(|bar| bar.trade_date);
        let skip = bars.len().saturating_sub(count);
        debug!(ticker = %ticker, bars = bars.len() - skip, "quotes loaded");
        Ok(bars.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_suffix() {
        assert_eq!(YahooBarSource::ticker("600519"), "600519.SS");
        assert_eq!(YahooBarSource::ticker("000001"), "000001.SZ");
        assert_eq!(YahooBarSource::ticker("300750"), "300750.SZ");
        assert_eq!(YahooBarSource::ticker("830799"), "830799.BJ");
        assert_eq!(YahooBarSource::ticker("AAPL"), "AAPL");
        assert_eq!(YahooBarSource::ticker("0700.H"), "0700.H");
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_recent_bars() {
        let bars = YahooBarSource::new().recent_bars("600519", 20).await.unwrap();
        assert!(!bars.is_empty());
        assert!(bars.len() <= 20);
        assert!(bars.windows(2).all(|w| w[0].trade_date <= w[1].trade_date));
    }
}
