//! 일봉 레코드.
//!
//! `change`, `h_change`는 파생 컬럼입니다. 저장하지 않으며 시계열을 구성할
//! 때마다 [`derive_changes`]로 다시 계산합니다.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{format_percent, format_price, percent_change, DecimalExt, Percentage, Price, Volume};

/// 문자열 경계에서 사용하는 날짜 포맷.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// `end`에서 `days`일 전 날짜. 표현 범위를 벗어나면 [`NaiveDate::MIN`]으로 고정.
pub fn days_before(end: NaiveDate, days: u32) -> NaiveDate {
    end.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// 한 심볼의 하루치 거래 데이터.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
    /// PER (EPS를 제공하는 소스일 때만)
    pub pe: Option<Decimal>,
    /// 전일 종가 대비 종가 변동률
    pub change: Option<Percentage>,
    /// *전일 고가* 대비 종가 변동률
    pub h_change: Option<Percentage>,
}

impl DailyRecord {
    /// 파생 컬럼 없이 레코드 생성.
    pub fn new(
        symbol: impl Into<String>,
        date: NaiveDate,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Volume,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            open,
            high,
            low,
            close,
            volume,
            pe: None,
            change: None,
            h_change: None,
        }
    }

    pub fn with_pe(mut self, pe: Option<Decimal>) -> Self {
        self.pe = pe;
        self
    }

    /// 모든 컬럼을 문자열로 렌더링한 표시용 뷰.
    pub fn to_view(&self) -> DailyRecordView {
        DailyRecordView::from(self)
    }
}

/// 한 번의 순방향 패스로 `change`, `h_change`를 재계산합니다.
///
/// `records`는 과거→최신 순이어야 합니다. 첫 레코드는 이전 값이 없으므로
/// 더 긴 이력의 일부 구간이더라도 두 파생 컬럼을 비웁니다.
///
/// `h_change`는 당일 고가가 아니라 전일 고가와 당일 종가를 비교합니다.
pub fn derive_changes(records: &mut [DailyRecord]) {
    let mut prev: Option<(Price, Price)> = None;

    for record in records.iter_mut() {
        match prev {
            Some((prev_close, prev_high)) => {
                record.change = percent_change(record.close, prev_close);
                record.h_change = percent_change(record.close, prev_high);
            }
            None => {
                record.change = None;
                record.h_change = None;
            }
        }
        prev = Some((record.close, record.high));
    }
}

/// TTM EPS로 PER을 채웁니다. EPS가 0 이하이면 비워 둡니다.
pub fn apply_pe(records: &mut [DailyRecord], ttm_eps: Decimal) {
    if ttm_eps <= Decimal::ZERO {
        return;
    }
    for record in records.iter_mut() {
        record.pe = Some((record.close / ttm_eps).round_display());
    }
}

/// 출력 계층용 [`DailyRecord`] 문자열 뷰.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecordView {
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub change: String,
    #[serde(rename = "hchange")]
    pub h_change: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub pe: String,
}

impl From<&DailyRecord> for DailyRecordView {
    fn from(r: &DailyRecord) -> Self {
        Self {
            date: r.date.format(DATE_FORMAT).to_string(),
            open: r.open.to_price_string(),
            high: r.high.to_price_string(),
            low: r.low.to_price_string(),
            close: r.close.to_price_string(),
            volume: r.volume.to_string(),
            change: format_percent(r.change),
            h_change: format_percent(r.h_change),
            pe: format_price(r.pe),
        }
    }
}
