//! 신선도 기반 일봉 시계열 조회.
//!
//! 요청마다 로컬 캐시 응답, 최근 구간 증분 조회, 전체 구간 조회 중 하나를
//! 결정하고, 외부 제공자가 실패하면 기존 캐시 데이터로 대체 응답합니다.
//!
//! # 흐름
//!
//! ```text
//! 요청 (symbol, days, alternate?)
//!         │
//!         ▼
//! ┌──────────────────────┐
//! │ 1. 심볼별 락          │ ← 심볼당 동시 조회 1개
//! └──────────┬───────────┘
//!            │
//!   ┌────────▼────────┐
//!   │ 오늘 조회 & 커버?│── YES ──► 캐시 응답 (행이 없어도)
//!   └────────┬────────┘
//!            │ NO
//!   ┌────────▼────────┐
//!   │ 커버?           │── YES ──► 증분 구간: min(days, 경과일 + 여유)
//!   └────────┬────────┘
//!            │ NO
//!            ▼
//!      전체 구간
//!            │
//!   ┌────────▼────────┐   실패   ┌────────────────────────┐
//!   │ 2. 제공자 조회   │────────► │ 기존 캐시 또는 에러      │
//!   └────────┬────────┘          └────────────────────────┘
//!            │ 성공
//!   ┌────────▼────────┐
//!   │ 3. 저장 + 메타   │ ← 실패는 로그만 남김
//!   └────────┬────────┘
//!            │
//!   ┌────────▼─────────────────┐
//!   │ 4. 전체 구간 재조회        │
//!   └──────────────────────────┘
//! ```

use crate::storage::FreshnessCache;
use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use stock_core::{
    apply_pe, days_before, derive_changes, DailyPriceProvider, DailyRecord, DailyRecordView, FetchMeta,
    ProviderConfig, ProviderError, StockError, StockResult,
};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// 심볼별 조회 락.
type FetchLockMap = Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>;

// =============================================================================
// 제공자
// =============================================================================

/// 기본 제공자와 (선택) 고정 심볼용 대체 제공자.
#[derive(Clone)]
pub struct ProviderSet {
    primary: Arc<dyn DailyPriceProvider>,
    alternate: Option<Arc<dyn DailyPriceProvider>>,
}

impl ProviderSet {
    pub fn new(primary: Arc<dyn DailyPriceProvider>) -> Self {
        Self {
            primary,
            alternate: None,
        }
    }

    pub fn with_alternate(mut self, alternate: Arc<dyn DailyPriceProvider>) -> Self {
        self.alternate = Some(alternate);
        self
    }

    /// 요청을 처리할 제공자. 대체 제공자가 없으면 기본 제공자.
    pub fn select(&self, use_alternate: bool) -> &Arc<dyn DailyPriceProvider> {
        match (&self.alternate, use_alternate) {
            (Some(alternate), true) => alternate,
            _ => &self.primary,
        }
    }

    /// `source`로 등록된 제공자의 EPS 제공 여부.
    pub fn supplies_eps(&self, source: &str) -> Option<bool> {
        std::iter::once(&self.primary)
            .chain(self.alternate.iter())
            .find(|p| p.id() == source)
            .map(|p| p.supplies_eps())
    }
}

// =============================================================================
// 요청 / 응답
// =============================================================================

/// 시계열 요청.
#[derive(Debug, Clone)]
pub struct SeriesRequest {
    pub symbol: String,
    /// 오늘부터 거슬러 올라가는 달력 일수
    pub days: u32,
    pub use_alternate: bool,
    /// 평가 시각 (`None`이면 현재)
    pub now: Option<DateTime<Utc>>,
    pub cancel: Option<CancellationToken>,
}

impl SeriesRequest {
    pub fn new(symbol: impl Into<String>, days: u32) -> Self {
        Self {
            symbol: symbol.into(),
            days,
            use_alternate: false,
            now: None,
            cancel: None,
        }
    }

    pub fn alternate(mut self, use_alternate: bool) -> Self {
        self.use_alternate = use_alternate;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// 응답 시계열의 출처.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SeriesOrigin {
    /// 신선한 캐시 히트 (제공자 호출 없음)
    Cache,
    /// 제공자 조회 결과와 캐시 이력 병합
    Fetched,
    /// 제공자 실패, 기존 캐시 데이터 응답
    Stale { reason: String },
}

impl SeriesOrigin {
    pub fn is_stale(&self) -> bool {
        matches!(self, SeriesOrigin::Stale { .. })
    }
}

/// 출처 메타데이터를 포함한 일봉 시계열.
#[derive(Debug, Clone)]
pub struct StockSeries {
    pub symbol: String,
    /// 최신순
    pub records: Vec<DailyRecord>,
    /// 모르면 0
    pub ttm_eps: Decimal,
    pub company_name: String,
    /// 응답한 소스가 EPS를 제공하면 true
    pub has_pe: bool,
    pub source: String,
    pub origin: SeriesOrigin,
}

impl StockSeries {
    /// 집계기가 기대하는 시간순(오래된 순) 레코드.
    pub fn oldest_first(&self) -> Vec<DailyRecord> {
        self.records.iter().rev().cloned().collect()
    }

    pub fn views(&self) -> Vec<DailyRecordView> {
        self.records.iter().map(DailyRecordView::from).collect()
    }
}

// =============================================================================
// 결정
// =============================================================================

/// 요청 하나에 대한 캐시 결정 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// 신선하고 구간을 커버함 (제공자 호출 없음)
    ServeCache,
    /// 커버하지만 오래됨 (최근 며칠만 조회)
    Delta(u32),
    /// 없거나 커버하지 못함 (요청 구간 전체 조회)
    Full(u32),
}

/// 캐시 응답, 증분 조회, 전체 조회 중 하나를 선택합니다.
///
/// 증분 구간은 `days_since_fetch + margin_days`이며 요청 일수를 넘지 않습니다.
/// 여유 일수는 주말과 휴장일을 흡수합니다.
pub fn plan_fetch(
    meta: Option<&FetchMeta>,
    start: NaiveDate,
    requested_days: u32,
    now: DateTime<Utc>,
    margin_days: i64,
) -> FetchPlan {
    match meta {
        Some(meta) if meta.covers_range(start) => {
            if meta.is_fresh_at(now) {
                FetchPlan::ServeCache
            } else {
                let window = meta.days_since_fetch(now).saturating_add(margin_days).max(1);
                let window = u32::try_from(window).unwrap_or(u32::MAX);
                FetchPlan::Delta(window.min(requested_days))
            }
        }
        _ => FetchPlan::Full(requested_days),
    }
}

/// 오래된 순으로 정렬해 등락률을 계산한 뒤 최신순으로 반환.
fn with_derived_changes(mut records: Vec<DailyRecord>) -> Vec<DailyRecord> {
    records.sort_by_key(|r| r.date);
    derive_changes(&mut records);
    records.reverse();
    records
}

/// 구간 안의 조회 데이터를 날짜 기준으로 캐시 데이터 위에 덮어씁니다.
fn merge_by_date(cached: Vec<DailyRecord>, fresh: Vec<DailyRecord>, window: Window) -> Vec<DailyRecord> {
    let mut by_date: BTreeMap<NaiveDate, DailyRecord> =
        cached.into_iter().map(|r| (r.date, r)).collect();
    for record in fresh.into_iter().filter(|r| window.contains(r.date)) {
        by_date.insert(record.date, record);
    }
    with_derived_changes(by_date.into_values().collect())
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

impl Window {
    fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// 제공자 조회 성공 결과.
struct Fetched {
    source: String,
    supplies_eps: bool,
    /// 최신순, PER 적용, 등락률 비어 있음
    records: Vec<DailyRecord>,
    ttm_eps: Decimal,
    company_name: String,
}

// =============================================================================
// 조회 조율기
// =============================================================================

/// 캐시 우선 일봉 시계열 조회기.
///
/// 캐시 없이도 동작하며, 이 경우 모든 요청이 제공자로 전달됩니다.
pub struct FetchOrchestrator {
    cache: Option<FreshnessCache>,
    providers: ProviderSet,
    config: ProviderConfig,
    fetch_locks: FetchLockMap,
}

impl FetchOrchestrator {
    pub fn new(cache: Option<FreshnessCache>, providers: ProviderSet, config: ProviderConfig) -> Self {
        Self {
            cache,
            providers,
            config,
            fetch_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> Option<&FreshnessCache> {
        self.cache.as_ref()
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// 최근 `days` 달력 일수의 `symbol` 일봉 시계열.
    pub async fn get_stock_series(
        &self,
        symbol: &str,
        days: u32,
        use_alternate: bool,
    ) -> StockResult<StockSeries> {
        self.fetch_series(SeriesRequest::new(symbol, days).alternate(use_alternate))
            .await
    }

    /// 모든 옵션을 지정한 요청의 일봉 시계열.
    #[instrument(skip(self, request), fields(symbol = %request.symbol, days = request.days))]
    pub async fn fetch_series(&self, request: SeriesRequest) -> StockResult<StockSeries> {
        let symbol = request.symbol.trim().to_uppercase();
        let now = request.now.unwrap_or_else(Utc::now);
        let use_alternate = request.use_alternate || self.config.pins_alternate(&symbol);
        let provider = Arc::clone(self.providers.select(use_alternate));
        let cancel = request.cancel.as_ref();

        let end = now.with_timezone(&Local).date_naive();
        let window = Window {
            start: days_before(end, request.days),
            end,
        };

        let Some(cache) = &self.cache else {
            let fetched = self
                .fetch_from_provider(provider.as_ref(), &symbol, request.days, cancel)
                .await?;
            return Ok(StockSeries {
                symbol,
                records: with_derived_changes(fetched.records),
                ttm_eps: fetched.ttm_eps,
                company_name: fetched.company_name,
                has_pe: fetched.supplies_eps,
                source: fetched.source,
                origin: SeriesOrigin::Fetched,
            });
        };

        // 결정 + 조회 + 저장 동안 유지 (동시 요청은 하나로 합쳐짐)
        let lock = self.get_or_create_lock(&symbol).await;
        let _guard = lock.lock().await;

        let meta = match cache.get_meta(&symbol).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "조회 기록 읽기 실패, 캐시 미스로 처리");
                None
            }
        };

        let plan = plan_fetch(
            meta.as_ref(),
            window.start,
            request.days,
            now,
            self.config.stale_margin_days,
        );

        let fetch_days = match plan {
            FetchPlan::ServeCache => match cache.get_range(&symbol, window.start, window.end).await {
                // 구간에 행이 없어도 오늘 조회로 커버된 구간이면 그대로 응답
                Ok(records) => {
                    if let Some(meta) = &meta {
                        debug!(symbol = %symbol, rows = records.len(), "캐시 히트");
                        return Ok(self.cached_series(meta, records, SeriesOrigin::Cache));
                    }
                    request.days
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "캐시 읽기 실패, 전체 구간 조회");
                    request.days
                }
            },
            FetchPlan::Delta(days) => {
                debug!(symbol = %symbol, fetch_days = days, "오래된 캐시, 증분 구간 조회");
                days
            }
            FetchPlan::Full(days) => {
                debug!(symbol = %symbol, fetch_days = days, "캐시 미스, 전체 구간 조회");
                days
            }
        };

        match self
            .fetch_from_provider(provider.as_ref(), &symbol, fetch_days, cancel)
            .await
        {
            Ok(fetched) => {
                let fetch_start = days_before(window.end, fetch_days);
                Ok(self
                    .store_and_serve(cache, &symbol, meta.as_ref(), fetched, window, fetch_start, now)
                    .await)
            }
            Err(err) => self.serve_stale(cache, &symbol, meta, err, window).await,
        }
    }

    /// 펀더멘털(제공 시) 후 가격 조회. 각 호출에 제한 시간 적용.
    async fn fetch_from_provider(
        &self,
        provider: &dyn DailyPriceProvider,
        symbol: &str,
        days: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<Fetched, ProviderError> {
        let (company_name, ttm_eps) = match provider.fundamentals() {
            Some(source) => {
                let fundamentals = self
                    .with_deadline(source.fetch_fundamentals(symbol), cancel)
                    .await?;
                let ttm_eps = fundamentals.ttm_eps().unwrap_or(Decimal::ZERO);
                (fundamentals.company_name, ttm_eps)
            }
            None => (String::new(), Decimal::ZERO),
        };

        let mut records = self
            .with_deadline(provider.fetch_daily_prices(symbol, days), cancel)
            .await?;
        if records.is_empty() {
            return Err(ProviderError::NoData(symbol.to_string()));
        }

        for record in records.iter_mut() {
            record.symbol = symbol.to_string();
        }
        apply_pe(&mut records, ttm_eps);

        Ok(Fetched {
            source: provider.id().to_string(),
            supplies_eps: provider.supplies_eps(),
            records,
            ttm_eps,
            company_name,
        })
    }

    /// 설정된 제한 시간과 호출자의 취소 토큰으로 제공자 호출을 제한합니다.
    async fn with_deadline<T, F>(
        &self,
        call: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let bounded = tokio::time::timeout(self.config.timeout(), call);
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ProviderError::Cancelled),
                outcome = bounded => outcome,
            },
            None => bounded.await,
        };
        outcome.map_err(|_| ProviderError::Timeout(self.config.timeout_secs))?
    }

    /// 조회 결과를 저장하고 캐시에서 응답합니다 (증분은 기존 이력과 병합).
    ///
    /// 커버 구간은 반환된 가장 오래된 행이 아니라 `fetch_start`부터 기록합니다.
    /// 구간 시작의 비거래일에는 행이 없습니다.
    #[allow(clippy::too_many_arguments)]
    async fn store_and_serve(
        &self,
        cache: &FreshnessCache,
        symbol: &str,
        previous: Option<&FetchMeta>,
        fetched: Fetched,
        window: Window,
        fetch_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> StockSeries {
        let Fetched {
            source,
            supplies_eps,
            records: fresh,
            ttm_eps,
            company_name,
        } = fetched;

        let earliest = fresh
            .iter()
            .map(|r| r.date)
            .min()
            .map_or(fetch_start, |oldest| oldest.min(fetch_start));
        let latest = fresh.iter().map(|r| r.date).max().unwrap_or(window.end);
        let meta = FetchMeta {
            symbol: symbol.to_string(),
            source: source.clone(),
            company_name: company_name.clone(),
            ttm_eps,
            last_fetched: now,
            latest_date: latest,
            earliest_date: earliest,
        }
        .widen_from(previous);

        let stored = match cache.store_fetch(&fresh, &meta).await {
            Ok(count) => {
                debug!(symbol = %symbol, stored = count, "조회 데이터 캐시 저장");
                true
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "캐시 저장 실패, 조회 데이터로 계속");
                false
            }
        };

        let records = match cache.get_range(symbol, window.start, window.end).await {
            Ok(cached) if stored => cached,
            Ok(cached) => merge_by_date(cached, fresh, window),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "캐시 읽기 실패, 조회 데이터 그대로 응답");
                with_derived_changes(fresh)
            }
        };

        StockSeries {
            symbol: symbol.to_string(),
            records,
            ttm_eps,
            company_name,
            has_pe: supplies_eps,
            source,
            origin: SeriesOrigin::Fetched,
        }
    }

    /// 제공자 실패 시 캐시에 있는 데이터로 대체 응답합니다.
    async fn serve_stale(
        &self,
        cache: &FreshnessCache,
        symbol: &str,
        meta: Option<FetchMeta>,
        err: ProviderError,
        window: Window,
    ) -> StockResult<StockSeries> {
        let error = StockError::from(err);

        let Some(meta) = meta else {
            warn!(symbol = %symbol, error = %error, "제공자 실패, 캐시 이력 없음");
            return Err(error);
        };

        match cache.get_range(symbol, window.start, window.end).await {
            Ok(records) if !records.is_empty() => {
                warn!(
                    symbol = %symbol,
                    error = %error,
                    rows = records.len(),
                    "제공자 실패, 기존 캐시 반환"
                );
                let origin = SeriesOrigin::Stale {
                    reason: error.to_string(),
                };
                Ok(self.cached_series(&meta, records, origin))
            }
            Ok(_) => {
                warn!(symbol = %symbol, error = %error, "제공자 실패, 구간 내 캐시 데이터 없음");
                Err(error)
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %error, read_error = %e, "제공자 실패, 캐시 읽기 불가");
                Err(error)
            }
        }
    }

    fn cached_series(&self, meta: &FetchMeta, records: Vec<DailyRecord>, origin: SeriesOrigin) -> StockSeries {
        let has_pe = self
            .providers
            .supplies_eps(&meta.source)
            .unwrap_or(meta.ttm_eps > Decimal::ZERO);

        StockSeries {
            symbol: meta.symbol.clone(),
            records,
            ttm_eps: meta.ttm_eps,
            company_name: meta.company_name.clone(),
            has_pe,
            source: meta.source.clone(),
            origin,
        }
    }

    /// 심볼 락 (최초 사용 시 생성).
    ///
    /// 새 락을 만들 때 아무도 잡고 있지 않은 항목은 정리합니다.
    async fn get_or_create_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let locks = self.fetch_locks.read().await;
        if let Some(lock) = locks.get(key) {
            return lock.clone();
        }
        drop(locks);

        let mut locks = self.fetch_locks.write().await;
        locks.retain(|name, lock| name == key || Arc::strong_count(lock) > 1);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
