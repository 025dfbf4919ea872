//! 주가 시계열 시스템 오류 타입.
//!
//! 조회 계층의 호출자에게 전달되는 모든 실패는 [`StockError`]로 표현됩니다.

use thiserror::Error;

use crate::domain::ProviderError;

/// 주가 시계열 핵심 오류.
#[derive(Debug, Error)]
pub enum StockError {
    /// 외부 제공자 실패 (네트워크, 파싱, 타임아웃, 취소)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// 제공자에 해당 심볼이 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 캐시 읽기/쓰기 실패
    #[error("Storage error: {0}")]
    Storage(String),

    /// 알 수 없는 집계 기간
    #[error("Invalid period type: {0} (use weekly, monthly, quarterly, or yearly)")]
    InvalidPeriodType(String),

    /// 제공자와 캐시 모두 데이터 없음
    #[error("No data available: {0}")]
    NoData(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

/// 주가 시계열 작업의 결과 타입.
pub type StockResult<T> = Result<T, StockError>;

impl From<ProviderError> for StockError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(symbol) => StockError::SymbolNotFound(symbol),
            ProviderError::NoData(symbol) => StockError::NoData(symbol),
            other => StockError::ProviderUnavailable(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for StockError {
    fn from(err: config::ConfigError) -> Self {
        StockError::Config(err.to_string())
    }
}
