//! 가격/백분율용 Decimal 유틸리티.
//!
//! 가격은 고정소수점 [`Decimal`]로 보관하고 표시 시점에만 문자열로 변환합니다.
//! 표시는 항상 소수 둘째 자리, 0에서 먼 쪽 반올림(half-away-from-zero)입니다.

use rust_decimal::{Decimal, RoundingStrategy};

/// 금융 정밀도 가격 타입.
pub type Price = Decimal;

/// 퍼센트 단위 백분율 (5.25 = 5.25%).
pub type Percentage = Decimal;

/// 표시되는 모든 가격/백분율의 소수 자릿수.
pub const DISPLAY_DP: u32 = 2;

/// Decimal 표시 포맷 확장 트레이트.
pub trait DecimalExt {
    /// 표시 정밀도로 반올림.
    fn round_display(&self) -> Decimal;

    /// 소수 둘째 자리 고정 문자열 (예: "104.00").
    fn to_price_string(&self) -> String;

    /// 퍼센트 단위 값을 "-3.88%" 형식으로.
    fn to_percent_string(&self) -> String;
}

impl DecimalExt for Decimal {
    fn round_display(&self) -> Decimal {
        self.round_dp_with_strategy(DISPLAY_DP, RoundingStrategy::MidpointAwayFromZero)
    }

    fn to_price_string(&self) -> String {
        format!("{:.2}", self.round_display())
    }

    fn to_percent_string(&self) -> String {
        format!("{:.2}%", self.round_display())
    }
}

/// `base` 대비 `current`의 변동률.
///
/// `base`가 양수가 아니면 `None`을 반환하며, 표시 계층에서는 빈 문자열이 됩니다.
pub fn percent_change(current: Decimal, base: Decimal) -> Option<Percentage> {
    if base <= Decimal::ZERO {
        return None;
    }
    Some((current - base) / base * Decimal::ONE_HUNDRED)
}

/// 선택적 백분율 표시. 값이 없으면 빈 문자열이며 "0.00%"가 아닙니다.
pub fn format_percent(value: Option<Percentage>) -> String {
    value.map(|v| v.to_percent_string()).unwrap_or_default()
}

/// 선택적 가격 표시. 값이 없으면 빈 문자열.
pub fn format_price(value: Option<Price>) -> String {
    value.map(|v| v.to_price_string()).unwrap_or_default()
}

/// 표시 형식 가격 파싱. 빈 입력은 "값 없음".
pub fn parse_price(s: &str) -> Result<Option<Price>, rust_decimal::Error> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<Decimal>().map(Some)
}
