//! 일봉 데이터 관리.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 심볼별 조회 기록을 포함한 SQLite 일봉 캐시
//! - 캐시 우선 시계열 조회 (증분 조회, 오래된 캐시 대체 응답)
//! - Yahoo Finance 일봉 제공자
//! - 애플리케이션 설정 기반 서비스 구성

pub mod cache;
pub mod error;
pub mod provider;
pub mod service;
pub mod storage;

pub use error::{DataError, Result};

pub use cache::{
    plan_fetch, FetchOrchestrator, FetchPlan, ProviderSet, SeriesOrigin, SeriesRequest,
    StockSeries,
};
pub use provider::{YahooDailyProvider, YAHOO_PROVIDER_ID};
pub use service::StockDataService;
pub use storage::{DailyPriceRow, FetchLogRow, FreshnessCache};
