//! 캐싱 계층.
//!
//! - 시계열 조회 조율: 캐시 우선 일봉 조회, 증분 조회, 오래된 캐시 대체 응답

pub mod series;

pub use series::{
    plan_fetch, FetchOrchestrator, FetchPlan, ProviderSet, SeriesOrigin, SeriesRequest,
    StockSeries,
};
