//! 주식 데이터 서비스.
//!
//! 애플리케이션 설정으로 캐시와 조회 조율기를 구성하고, 외부 계층이 쓰는
//! 두 가지 요청(일봉 시계열, 기간 집계)을 제공합니다.

use crate::cache::{FetchOrchestrator, ProviderSet, StockSeries};
use crate::provider::YahooDailyProvider;
use crate::storage::FreshnessCache;
use std::sync::Arc;
use stock_core::{
    aggregate_periods, init_logging, series_span, AppConfig, PeriodSummary, PeriodType, StockResult,
};
use tracing::{debug, info, warn, Instrument};

/// 일봉 시계열의 기간 집계.
#[derive(Debug, Clone)]
pub struct PeriodReport {
    pub period_type: PeriodType,
    pub series: StockSeries,
    /// 최신 기간 우선
    pub periods: Vec<PeriodSummary>,
}

/// 일봉 시계열 조회의 진입점.
pub struct StockDataService {
    orchestrator: FetchOrchestrator,
}

impl StockDataService {
    /// 서비스 생성. 열 수 없는 캐시는 로그를 남기고 건너뜁니다.
    pub async fn new(config: &AppConfig, providers: ProviderSet) -> Self {
        info!("StockDataService 초기화 중...");

        let cache = match config.cache.resolve_db_path() {
            Some(path) => match FreshnessCache::connect(&path, config.cache.max_connections).await {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(path = %path, error = %e, "캐시 열기 실패. 캐시 없이 계속합니다.");
                    None
                }
            },
            None => {
                info!("캐시 비활성화");
                None
            }
        };

        Self {
            orchestrator: FetchOrchestrator::new(cache, providers, config.provider.clone()),
        }
    }

    /// `STOCK__*` 환경 변수로 설정을 읽고 Yahoo Finance로 응답합니다.
    ///
    /// 설정의 `[logging]` 섹션으로 로깅을 초기화합니다. 이미 전역
    /// subscriber가 있으면 그대로 둡니다.
    pub async fn from_env() -> StockResult<Self> {
        let config = AppConfig::from_env()?;
        if let Err(e) = init_logging(config.logging.to_log_config()) {
            debug!(error = %e, "로깅 초기화 건너뜀");
        }
        let providers = yahoo_providers()?;
        Ok(Self::new(&config, providers).await)
    }

    pub fn with_orchestrator(orchestrator: FetchOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.orchestrator.cache().is_some()
    }

    pub async fn get_stock_series(
        &self,
        symbol: &str,
        days: u32,
        use_alternate: bool,
    ) -> StockResult<StockSeries> {
        self.orchestrator
            .get_stock_series(symbol, days, use_alternate)
            .await
    }

    /// 시계열을 기간별로 집계합니다.
    ///
    /// 기간 이름은 데이터 조회 전에 검증합니다.
    pub async fn get_period_report(
        &self,
        symbol: &str,
        days: u32,
        use_alternate: bool,
        period_name: &str,
    ) -> StockResult<PeriodReport> {
        let period_type: PeriodType = period_name.parse()?;

        let span = series_span!("period_report", symbol, days);
        async move {
            let series = self
                .orchestrator
                .get_stock_series(symbol, days, use_alternate)
                .await?;
            let periods = aggregate_periods(&series.oldest_first(), period_type);

            info!(
                period = %period_type,
                periods = periods.len(),
                origin = ?series.origin,
                "기간 집계 완료"
            );

            Ok(PeriodReport {
                period_type,
                series,
                periods,
            })
        }
        .instrument(span)
        .await
    }
}

/// Yahoo Finance만 사용하는 제공자 구성.
pub fn yahoo_providers() -> StockResult<ProviderSet> {
    let yahoo = YahooDailyProvider::new()?;
    Ok(ProviderSet::new(Arc::new(yahoo)))
}
