//! 외부 데이터 제공자 추상화.
//!
//! 제공자는 항상 일봉 가격을 제공합니다. 펀더멘털(회사명, EPS 이력)은
//! [`DailyPriceProvider::fundamentals`]로 노출되는 선택 기능이므로, 호출자는
//! 구체 타입을 몰라도 해당 소스로 PER을 계산할 수 있는지 알 수 있습니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use super::DailyRecord;

// =============================================================================
// 오류 타입
// =============================================================================

/// 제공자 실패.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// 네트워크 실패
    #[error("network error: {0}")]
    Network(String),

    /// 응답 파싱 실패
    #[error("parse error: {0}")]
    Parse(String),

    /// 제공자가 모르는 심볼
    #[error("symbol not found: {0}")]
    NotFound(String),

    /// 요청은 성공했으나 데이터 없음
    #[error("no rows returned for {0}")]
    NoData(String),

    /// 제한 시간 초과 (초)
    #[error("provider call timed out after {0}s")]
    Timeout(u64),

    /// 호출자가 요청을 취소함
    #[error("provider call cancelled")]
    Cancelled,
}

// =============================================================================
// 펀더멘털
// =============================================================================

/// 보고된 EPS 값 하나.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpsPoint {
    pub date: NaiveDate,
    pub eps: Decimal,
}

/// PER 계산에 쓰는 기업 펀더멘털.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fundamentals {
    pub company_name: String,
    pub eps_series: Vec<EpsPoint>,
}

impl Fundamentals {
    /// 가장 최근의 양수 EPS.
    ///
    /// 적자 기간은 건너뜁니다. 음수 EPS로는 의미 있는 PER이 나오지 않습니다.
    pub fn ttm_eps(&self) -> Option<Decimal> {
        self.eps_series
            .iter()
            .filter(|p| p.eps > Decimal::ZERO)
            .max_by_key(|p| p.date)
            .map(|p| p.eps)
    }
}

// =============================================================================
// 제공자 트레이트
// =============================================================================

/// 일봉 OHLCV 이력 소스.
///
/// # 예시
///
/// ```ignore
/// struct CsvProvider { dir: PathBuf }
///
/// #[async_trait]
/// impl DailyPriceProvider for CsvProvider {
///     fn id(&self) -> &str { "csv" }
///
///     async fn fetch_daily_prices(&self, symbol: &str, max_days: u32)
///         -> Result<Vec<DailyRecord>, ProviderError> {
///         // 읽어서 변환
///     }
/// }
/// ```
#[async_trait]
pub trait DailyPriceProvider: Send + Sync {
    /// 고정 식별자. 조회 데이터의 `source`로 저장됩니다.
    fn id(&self) -> &str;

    /// 최대 `max_days` 달력일의 이력을 최신순으로 조회합니다.
    ///
    /// 파생 컬럼(`change`, `h_change`, `pe`)은 비워 둡니다.
    ///
    /// # Errors
    ///
    /// - `ProviderError::NotFound`: 알 수 없는 심볼
    /// - `ProviderError::NoData`: 구간에 데이터 없음
    /// - `ProviderError::Network`: 외부 호출 실패
    /// - `ProviderError::Parse`: 잘못된 응답
    async fn fetch_daily_prices(
        &self,
        symbol: &str,
        max_days: u32,
    ) -> Result<Vec<DailyRecord>, ProviderError>;

    /// 펀더멘털 기능. EPS 데이터가 없는 소스면 `None`.
    fn fundamentals(&self) -> Option<&dyn FundamentalsProvider> {
        None
    }

    /// 이 소스로 PER을 계산할 수 있으면 true.
    fn supplies_eps(&self) -> bool {
        self.fundamentals().is_some()
    }
}

/// 회사명과 EPS 이력 소스.
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, ProviderError>;
}
