//! 조회 조율 통합 테스트
//!
//! 인메모리 캐시와 스크립트된 제공자로 조율기를 구동합니다. 요청 시각을
//! 고정해 신선도 결정이 결정적입니다.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stock_core::{
    AppConfig, DailyPriceProvider, DailyRecord, EpsPoint, FetchMeta, Fundamentals,
    FundamentalsProvider, ProviderConfig, ProviderError, StockError, Volume,
};
use stock_data::{
    FetchOrchestrator, FreshnessCache, ProviderSet, SeriesOrigin, SeriesRequest, StockDataService,
};
use tokio_util::sync::CancellationToken;

// =============================================================================
// 스크립트된 제공자
// =============================================================================

struct MockProvider {
    id: &'static str,
    today: Mutex<NaiveDate>,
    eps: Option<Decimal>,
    calls: AtomicUsize,
    last_days: AtomicU32,
    fail: AtomicBool,
    skip_weekends: AtomicBool,
    delay_ms: AtomicU64,
}

impl MockProvider {
    fn new(id: &'static str, today: NaiveDate) -> Arc<Self> {
        Arc::new(Self::build(id, today, None))
    }

    fn with_eps(id: &'static str, today: NaiveDate, eps: Decimal) -> Arc<Self> {
        Arc::new(Self::build(id, today, Some(eps)))
    }

    fn build(id: &'static str, today: NaiveDate, eps: Option<Decimal>) -> Self {
        Self {
            id,
            today: Mutex::new(today),
            eps,
            calls: AtomicUsize::new(0),
            last_days: AtomicU32::new(0),
            fail: AtomicBool::new(false),
            skip_weekends: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_days(&self) -> u32 {
        self.last_days.load(Ordering::SeqCst)
    }

    fn set_today(&self, today: NaiveDate) {
        *self.today.lock().unwrap() = today;
    }

    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn set_skip_weekends(&self, skip: bool) {
        self.skip_weekends.store(skip, Ordering::SeqCst);
    }

    fn set_delay(&self, delay: std::time::Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn close_for(date: NaiveDate) -> Decimal {
        Decimal::from(100 + (date.ordinal0() % 10))
    }
}

#[async_trait]
impl DailyPriceProvider for MockProvider {
    fn id(&self) -> &str {
        self.id
    }

    async fn fetch_daily_prices(
        &self,
        symbol: &str,
        max_days: u32,
    ) -> Result<Vec<DailyRecord>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_days.store(max_days, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("connection reset".to_string()));
        }

        let today = *self.today.lock().unwrap();
        let skip_weekends = self.skip_weekends.load(Ordering::SeqCst);
        // 실제 제공자처럼 반환 이력에는 상한이 있음
        Ok((0..i64::from(max_days.min(400)))
            .map(|i| today - Duration::days(i))
            .filter(|date| !skip_weekends || !matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
            .map(|date| {
                let close = Self::close_for(date);
                DailyRecord::new(
                    symbol,
                    date,
                    close,
                    close + dec!(2),
                    close - dec!(3),
                    close,
                    Volume::from_shares(1_500_000),
                )
            })
            .collect())
    }

    fn fundamentals(&self) -> Option<&dyn FundamentalsProvider> {
        self.eps.map(|_| self as &dyn FundamentalsProvider)
    }
}

#[async_trait]
impl FundamentalsProvider for MockProvider {
    async fn fetch_fundamentals(&self, _symbol: &str) -> Result<Fundamentals, ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("connection reset".to_string()));
        }
        Ok(Fundamentals {
            company_name: "Example Corp".to_string(),
            eps_series: vec![EpsPoint {
                date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                eps: self.eps.unwrap_or_default(),
            }],
        })
    }
}

// =============================================================================
// 헬퍼
// =============================================================================

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn local_noon(date: NaiveDate) -> DateTime<Utc> {
    Local
        .from_local_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
        .unwrap()
        .with_timezone(&Utc)
}

async fn orchestrator(provider: Arc<MockProvider>) -> (FetchOrchestrator, FreshnessCache) {
    let cache = FreshnessCache::in_memory().await.unwrap();
    let orchestrator = FetchOrchestrator::new(
        Some(cache.clone()),
        ProviderSet::new(provider),
        ProviderConfig::default(),
    );
    (orchestrator, cache)
}

fn request(symbol: &str, days: u32, day: NaiveDate) -> SeriesRequest {
    SeriesRequest::new(symbol, days).at(local_noon(day))
}

// =============================================================================
// 결정 상태
// =============================================================================

#[tokio::test]
async fn test_miss_fetches_full_window() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    let series = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(provider.last_days(), 30);
    assert_eq!(series.origin, SeriesOrigin::Fetched);
    assert_eq!(series.records.len(), 30);
    assert_eq!(series.records[0].date, today());
    assert!(series.records.windows(2).all(|w| w[0].date > w[1].date));
    assert!(series.records.last().unwrap().change.is_none());
    assert!(series.records[0].change.is_some());
    assert!(!series.has_pe);
    assert_eq!(series.source, "primary");
}

#[tokio::test]
async fn test_fresh_hit_skips_provider() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    let first = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap();
    let second = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(second.origin, SeriesOrigin::Cache);
    assert_eq!(first.records, second.records);
}

#[tokio::test]
async fn test_stale_by_one_day_fetches_small_delta_and_merges() {
    let yesterday = today() - Duration::days(1);
    let provider = MockProvider::new("primary", yesterday);
    let (orchestrator, cache) = orchestrator(provider.clone()).await;

    orchestrator
        .fetch_series(request("AAPL", 30, yesterday))
        .await
        .unwrap();

    provider.set_today(today());
    let series = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 2);
    assert!(provider.last_days() <= 6, "delta window {}", provider.last_days());
    // 첫 조회의 과거 이력이 증분과 병합됨
    assert_eq!(series.records.len(), 31);
    assert_eq!(series.records[0].date, today());
    assert_eq!(series.records[30].date, today() - Duration::days(30));

    let meta = cache.get_meta("AAPL").await.unwrap().unwrap();
    assert_eq!(meta.earliest_date, yesterday - Duration::days(30));
    assert_eq!(meta.latest_date, today());
}

#[tokio::test]
async fn test_fresh_covered_log_without_rows_serves_empty_cache() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, cache) = orchestrator(provider.clone()).await;

    // 오늘 조회했고 구간을 커버하지만 구간 안에 행이 없음 (연휴 등)
    cache
        .update_meta(&FetchMeta {
            symbol: "AAPL".to_string(),
            source: "primary".to_string(),
            company_name: String::new(),
            ttm_eps: Decimal::ZERO,
            last_fetched: local_noon(today()),
            latest_date: today() - Duration::days(3),
            earliest_date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
        })
        .await
        .unwrap();

    let series = orchestrator
        .fetch_series(request("AAPL", 2, today()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 0);
    assert_eq!(series.origin, SeriesOrigin::Cache);
    assert!(series.records.is_empty());
}

#[tokio::test]
async fn test_coverage_recorded_from_requested_start_when_first_days_have_no_rows() {
    // 2024-06-10은 월요일, 2일 요청의 시작일 2024-06-08은 토요일
    let provider = MockProvider::new("primary", today());
    provider.set_skip_weekends(true);
    let (orchestrator, cache) = orchestrator(provider.clone()).await;

    let series = orchestrator
        .fetch_series(request("AAPL", 2, today()))
        .await
        .unwrap();
    assert_eq!(series.records.len(), 1);
    assert_eq!(series.records[0].date, today());

    // earliest_date = min(가장 오래된 행, 조회 시작일)
    let meta = cache.get_meta("AAPL").await.unwrap().unwrap();
    assert_eq!(meta.earliest_date, NaiveDate::from_ymd_opt(2024, 6, 8).unwrap());
    assert!(meta.earliest_date < series.records[0].date);

    let again = orchestrator
        .fetch_series(request("AAPL", 2, today()))
        .await
        .unwrap();
    assert_eq!(again.origin, SeriesOrigin::Cache);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_huge_day_count_clamps_window_instead_of_panicking() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, cache) = orchestrator(provider.clone()).await;

    let series = orchestrator
        .fetch_series(request("AAPL", u32::MAX, today()))
        .await
        .unwrap();
    assert_eq!(provider.calls(), 1);
    assert_eq!(provider.last_days(), u32::MAX);
    assert_eq!(series.origin, SeriesOrigin::Fetched);
    assert_eq!(series.records.len(), 400);

    let meta = cache.get_meta("AAPL").await.unwrap().unwrap();
    assert_eq!(meta.earliest_date, NaiveDate::MIN);

    let again = orchestrator
        .fetch_series(request("AAPL", u32::MAX, today()))
        .await
        .unwrap();
    assert_eq!(again.origin, SeriesOrigin::Cache);
    assert_eq!(again.records.len(), 400);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_uncovered_request_fetches_full_window() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    orchestrator
        .fetch_series(request("AAPL", 10, today()))
        .await
        .unwrap();
    let series = orchestrator
        .fetch_series(request("AAPL", 60, today()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(provider.last_days(), 60);
    assert_eq!(series.records.len(), 60);
}

// =============================================================================
// 실패 처리
// =============================================================================

#[tokio::test]
async fn test_provider_failure_serves_stale_with_cached_metadata() {
    let yesterday = today() - Duration::days(1);
    let provider = MockProvider::with_eps("primary", yesterday, dec!(5));
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    orchestrator
        .fetch_series(request("AAPL", 30, yesterday))
        .await
        .unwrap();

    provider.set_failing(true);
    let series = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap();

    assert!(series.origin.is_stale());
    assert_eq!(series.company_name, "Example Corp");
    assert_eq!(series.ttm_eps, dec!(5));
    assert!(series.has_pe);
    assert_eq!(series.records[0].date, yesterday);
    assert!(series.records[0].pe.is_some());
}

#[tokio::test]
async fn test_provider_failure_without_history_propagates() {
    let provider = MockProvider::new("primary", today());
    provider.set_failing(true);
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    let err = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn test_empty_stale_read_propagates_original_error() {
    let provider = MockProvider::new("primary", today());
    provider.set_failing(true);
    let (orchestrator, cache) = orchestrator(provider.clone()).await;

    // 조회 기록은 있지만 요청 구간 안에 행이 없음
    cache
        .update_meta(&FetchMeta {
            symbol: "AAPL".to_string(),
            source: "primary".to_string(),
            company_name: String::new(),
            ttm_eps: Decimal::ZERO,
            last_fetched: local_noon(today()) - Duration::days(3),
            latest_date: today() - Duration::days(3),
            earliest_date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
        })
        .await
        .unwrap();

    let err = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::ProviderUnavailable(ref msg) if msg.contains("connection reset")));
}

#[tokio::test]
async fn test_cancellation_falls_back_to_stale() {
    let yesterday = today() - Duration::days(1);
    let provider = MockProvider::new("primary", yesterday);
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    orchestrator
        .fetch_series(request("AAPL", 30, yesterday))
        .await
        .unwrap();

    provider.set_delay(std::time::Duration::from_secs(10));
    let token = CancellationToken::new();
    token.cancel();

    let series = orchestrator
        .fetch_series(request("AAPL", 30, today()).with_cancellation(token))
        .await
        .unwrap();

    match &series.origin {
        SeriesOrigin::Stale { reason } => assert!(reason.contains("cancelled"), "{}", reason),
        other => panic!("unexpected origin {:?}", other),
    }
}

#[tokio::test]
async fn test_cancellation_without_history_is_provider_unavailable() {
    let provider = MockProvider::new("primary", today());
    provider.set_delay(std::time::Duration::from_secs(10));
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    let token = CancellationToken::new();
    token.cancel();
    let err = orchestrator
        .fetch_series(request("AAPL", 30, today()).with_cancellation(token))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn test_timeout_is_provider_unavailable() {
    let provider = MockProvider::new("primary", today());
    provider.set_delay(std::time::Duration::from_secs(3));
    let cache = FreshnessCache::in_memory().await.unwrap();
    let config = ProviderConfig {
        timeout_secs: 1,
        ..Default::default()
    };
    let orchestrator = FetchOrchestrator::new(Some(cache), ProviderSet::new(provider), config);

    let err = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::ProviderUnavailable(ref msg) if msg.contains("timed out")));
}

#[tokio::test]
async fn test_storage_failure_serves_fetched_rows() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, cache) = orchestrator(provider.clone()).await;
    cache.pool().close().await;

    let series = orchestrator
        .fetch_series(request("AAPL", 30, today()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(series.origin, SeriesOrigin::Fetched);
    assert_eq!(series.records.len(), 30);
    assert!(series.records.last().unwrap().change.is_none());
    assert!(series.records[0].change.is_some());
}

// =============================================================================
// 제공자, 심볼, 동시성
// =============================================================================

#[tokio::test]
async fn test_cache_disabled_always_calls_provider() {
    let provider = MockProvider::new("primary", today());
    let orchestrator = FetchOrchestrator::new(
        None,
        ProviderSet::new(provider.clone()),
        ProviderConfig::default(),
    );

    for _ in 0..2 {
        let series = orchestrator
            .fetch_series(request("AAPL", 20, today()))
            .await
            .unwrap();
        assert_eq!(series.records.len(), 20);
        assert!(series.records[19].change.is_none());
        assert!(series.records[0].h_change.is_some());
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_suffix_pins_alternate_provider() {
    let primary = MockProvider::with_eps("primary", today(), dec!(5));
    let alternate = MockProvider::new("alternate", today());
    let cache = FreshnessCache::in_memory().await.unwrap();
    let orchestrator = FetchOrchestrator::new(
        Some(cache),
        ProviderSet::new(primary.clone()).with_alternate(alternate.clone()),
        ProviderConfig::default(),
    );

    let series = orchestrator
        .fetch_series(request("0700.hk", 10, today()))
        .await
        .unwrap();
    assert_eq!(series.symbol, "0700.HK");
    assert_eq!(series.source, "alternate");
    assert!(!series.has_pe);
    assert!(series.company_name.is_empty());
    assert_eq!(primary.calls(), 0);
    assert_eq!(alternate.calls(), 1);

    let series = orchestrator
        .fetch_series(request("MSFT", 10, today()).alternate(true))
        .await
        .unwrap();
    assert_eq!(series.source, "alternate");

    let series = orchestrator
        .fetch_series(request("AAPL", 10, today()))
        .await
        .unwrap();
    assert_eq!(series.source, "primary");
    assert!(series.has_pe);
    // close / 5
    let close = series.records[0].close;
    assert_eq!(series.records[0].pe, Some((close / dec!(5)).round_dp(2)));
}

#[tokio::test]
async fn test_symbol_normalised_for_cache() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, cache) = orchestrator(provider.clone()).await;

    orchestrator
        .fetch_series(request("  aapl ", 10, today()))
        .await
        .unwrap();
    let series = orchestrator
        .fetch_series(request("AAPL", 10, today()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(series.origin, SeriesOrigin::Cache);
    assert!(cache.get_meta("AAPL").await.unwrap().is_some());
    assert!(series.records.iter().all(|r| r.symbol == "AAPL"));
}

#[tokio::test]
async fn test_concurrent_requests_collapse_to_one_fetch() {
    let provider = MockProvider::new("primary", today());
    provider.set_delay(std::time::Duration::from_millis(100));
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;

    let requests = (0..4).map(|_| orchestrator.fetch_series(request("AAPL", 30, today())));
    let results = futures::future::join_all(requests).await;

    assert_eq!(provider.calls(), 1);
    let origins: Vec<_> = results.into_iter().map(|r| r.unwrap().origin).collect();
    assert_eq!(origins.iter().filter(|o| **o == SeriesOrigin::Fetched).count(), 1);
    assert_eq!(origins.iter().filter(|o| **o == SeriesOrigin::Cache).count(), 3);
}

// =============================================================================
// 서비스
// =============================================================================

#[tokio::test]
async fn test_invalid_period_rejected_before_fetch() {
    let provider = MockProvider::new("primary", today());
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;
    let service = StockDataService::with_orchestrator(orchestrator);

    let err = service
        .get_period_report("AAPL", 30, false, "fortnightly")
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::InvalidPeriodType(_)));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_period_report_newest_first() {
    let provider = MockProvider::new("primary", Local::now().date_naive());
    let (orchestrator, _cache) = orchestrator(provider.clone()).await;
    let service = StockDataService::with_orchestrator(orchestrator);

    let report = service
        .get_period_report("AAPL", 90, false, "monthly")
        .await
        .unwrap();

    assert!(report.periods.len() >= 3);
    assert!(report.periods.windows(2).all(|w| w[0].period > w[1].period));
    let days: usize = report.periods.iter().map(|p| p.days).sum();
    assert_eq!(days, report.series.records.len());
}

#[tokio::test]
async fn test_on_disk_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let mut config = AppConfig::default();
    config.cache.db_path = Some(path.to_string_lossy().into_owned());

    let provider = MockProvider::new("primary", Local::now().date_naive());
    let service = StockDataService::new(&config, ProviderSet::new(provider.clone())).await;
    assert!(service.is_cache_enabled());
    service.get_stock_series("AAPL", 15, false).await.unwrap();
    drop(service);

    provider.set_failing(true);
    let service = StockDataService::new(&config, ProviderSet::new(provider.clone())).await;
    let series = service.get_stock_series("AAPL", 15, false).await.unwrap();

    // 같은 로컬 날짜: 제공자 호출 없이 신선한 캐시로 응답
    assert_eq!(series.origin, SeriesOrigin::Cache);
    assert_eq!(provider.calls(), 1);
    assert_eq!(series.records.len(), 15);
}

#[tokio::test]
async fn test_disabled_cache_config() {
    let mut config = AppConfig::default();
    config.cache.db_path = Some("none".to_string());

    let provider = MockProvider::new("primary", Local::now().date_naive());
    let service = StockDataService::new(&config, ProviderSet::new(provider.clone())).await;
    assert!(!service.is_cache_enabled());

    service.get_stock_series("AAPL", 5, false).await.unwrap();
    service.get_stock_series("AAPL", 5, false).await.unwrap();
    assert_eq!(provider.calls(), 2);
}
