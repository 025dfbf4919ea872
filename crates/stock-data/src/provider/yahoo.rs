//! Yahoo Finance 일봉 제공자.
//!
//! 가격만 제공합니다. Yahoo 차트 엔드포인트에는 EPS 이력이 없으므로 이
//! 제공자는 펀더멘털 기능이 없고, 이 제공자가 응답한 시계열의 PER은
//! 비어 있습니다.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use stock_core::{DailyPriceProvider, DailyRecord, DecimalExt, ProviderError, Volume};
use time::OffsetDateTime;
use tracing::debug;

/// 캐시 `source`로 저장되는 제공자 ID.
pub const YAHOO_PROVIDER_ID: &str = "yahoo";

/// 차트 엔드포인트가 반환하는 일봉 하나.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyQuote {
    /// 장 시작 시각 (Unix 초)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl From<&yahoo_finance_api::Quote> for DailyQuote {
    fn from(q: &yahoo_finance_api::Quote) -> Self {
        Self {
            timestamp: q.timestamp as i64,
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            volume: q.volume as u64,
        }
    }
}

fn to_price(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .unwrap_or_default()
        .round_display()
}

/// 차트 일봉을 최신순 레코드로 변환합니다.
///
/// 종가가 0인 봉(거래정지, 자리표시 세션)과 표현할 수 없는 타임스탬프의
/// 봉은 건너뜁니다.
pub fn quotes_to_records(symbol: &str, quotes: &[DailyQuote]) -> Vec<DailyRecord> {
    let mut records: Vec<DailyRecord> = quotes
        .iter()
        .filter(|q| q.close != 0.0)
        .filter_map(|q| {
            let date = DateTime::<Utc>::from_timestamp(q.timestamp, 0)?.date_naive();
            Some(DailyRecord::new(
                symbol,
                date,
                to_price(q.open),
                to_price(q.high),
                to_price(q.low),
                to_price(q.close),
                Volume::from_shares(q.volume),
            ))
        })
        .collect();

    records.sort_by(|a, b| b.date.cmp(&a.date));
    records.dedup_by_key(|r| r.date);
    records
}

/// `max_days`일 전 시각. 차트 API가 받는 범위(Unix epoch 이후)로 고정합니다.
fn history_start(end: DateTime<Utc>, max_days: u32) -> DateTime<Utc> {
    end.checked_sub_signed(Duration::days(i64::from(max_days)))
        .unwrap_or(DateTime::UNIX_EPOCH)
        .max(DateTime::UNIX_EPOCH)
}

fn to_offset_datetime(at: DateTime<Utc>) -> Result<OffsetDateTime, ProviderError> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| ProviderError::Parse(format!("timestamp out of range: {}", e)))
}

/// Yahoo Finance 일봉.
pub struct YahooDailyProvider {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooDailyProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let connector = yahoo_finance_api::YahooConnector::new()
            .map_err(|e| ProviderError::Network(format!("Yahoo Finance connection failed: {}", e)))?;
        Ok(Self { connector })
    }
}

#[async_trait]
impl DailyPriceProvider for YahooDailyProvider {
    fn id(&self) -> &str {
        YAHOO_PROVIDER_ID
    }

    async fn fetch_daily_prices(
        &self,
        symbol: &str,
        max_days: u32,
    ) -> Result<Vec<DailyRecord>, ProviderError> {
        let end = Utc::now();
        let start = history_start(end, max_days);

        debug!(
            symbol = symbol,
            start = %start.date_naive(),
            end = %end.date_naive(),
            "Yahoo Finance 일봉 구간 요청"
        );

        let response = self
            .connector
            .get_quote_history_interval(symbol, to_offset_datetime(start)?, to_offset_datetime(end)?, "1d")
            .await
            .map_err(|e| ProviderError::Network(format!("Yahoo Finance API error ({}): {}", symbol, e)))?;

        let quotes = response
            .quotes()
            .map_err(|e| ProviderError::Parse(format!("quote parse error ({}): {}", symbol, e)))?;

        let bars: Vec<DailyQuote> = quotes.iter().map(DailyQuote::from).collect();
        let records = quotes_to_records(symbol, &bars);

        if records.is_empty() {
            return Err(ProviderError::NoData(symbol.to_string()));
        }

        Ok(records)
    }
}
