//! 일봉 시계열 기간 집계.
//!
//! 과거→최신 순 일봉을 주/월/분기/연 단위 요약으로 변환하고 하락 강도 구간별
//! 하락일 수를 셉니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use super::DailyRecord;
use crate::error::StockResult;
use crate::types::{format_percent, format_price, percent_change, DecimalExt, PeriodType, Percentage, Price, Volume};

/// 하루 하락폭의 강도 구간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropBucket {
    /// 2% 이상 3% 미만
    Two,
    /// 3% 이상 4% 미만
    Three,
    /// 4% 이상 5% 미만
    Four,
    /// 5% 이상
    FivePlus,
}

/// 변동률을 하락 구간으로 분류합니다.
///
/// 하락만 집계하며 -2%보다 큰 값은 구간이 없습니다. 하한은 포함이므로
/// 정확히 -3.00%는 [`DropBucket::Three`]에 속합니다.
pub fn classify_drop(pct: Percentage) -> Option<DropBucket> {
    if pct >= Decimal::ZERO {
        return None;
    }
    let magnitude = -pct;
    if magnitude >= Decimal::from(5) {
        Some(DropBucket::FivePlus)
    } else if magnitude >= Decimal::from(4) {
        Some(DropBucket::Four)
    } else if magnitude >= Decimal::from(3) {
        Some(DropBucket::Three)
    } else if magnitude >= Decimal::TWO {
        Some(DropBucket::Two)
    } else {
        None
    }
}

/// 한 구간의 종가 기준/저가 기준 하락일 카운터.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCount {
    pub close: u32,
    pub low: u32,
}

impl fmt::Display for DropCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.close, self.low)
    }
}

impl Serialize for DropCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn serialize_price<S: Serializer>(value: &Price, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_price_string())
}

fn serialize_opt_price<S: Serializer>(value: &Option<Price>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_price(*value))
}

fn serialize_opt_percent<S: Serializer>(
    value: &Option<Percentage>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_percent(*value))
}

/// 집계 기간 하나의 요약.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodSummary {
    /// 정렬 가능한 기간 키 (`2024-W02`, `2024-01`, `2024-Q1`, `2024`)
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(serialize_with = "serialize_price")]
    pub open: Price,
    #[serde(serialize_with = "serialize_price")]
    pub high: Price,
    #[serde(serialize_with = "serialize_price")]
    pub low: Price,
    #[serde(serialize_with = "serialize_price")]
    pub close: Price,
    pub volume: Volume,
    /// 이전 기간 종가 대비 변동률
    #[serde(serialize_with = "serialize_opt_percent")]
    pub change: Option<Percentage>,
    /// 기간 마지막 거래일의 PER
    #[serde(serialize_with = "serialize_opt_price")]
    pub pe: Option<Decimal>,
    pub days: usize,
    #[serde(rename = "drop2pct")]
    pub drop_2pct: DropCount,
    #[serde(rename = "drop3pct")]
    pub drop_3pct: DropCount,
    #[serde(rename = "drop4pct")]
    pub drop_4pct: DropCount,
    #[serde(rename = "drop5pct")]
    pub drop_5pct: DropCount,
}

impl PeriodSummary {
    fn bucket_mut(&mut self, bucket: DropBucket) -> &mut DropCount {
        match bucket {
            DropBucket::Two => &mut self.drop_2pct,
            DropBucket::Three => &mut self.drop_3pct,
            DropBucket::Four => &mut self.drop_4pct,
            DropBucket::FivePlus => &mut self.drop_5pct,
        }
    }

    /// 구간별 카운터.
    pub fn drops(&self, bucket: DropBucket) -> DropCount {
        match bucket {
            DropBucket::Two => self.drop_2pct,
            DropBucket::Three => self.drop_3pct,
            DropBucket::Four => self.drop_4pct,
            DropBucket::FivePlus => self.drop_5pct,
        }
    }
}

/// 과거→최신 순 일봉을 기간별로 집계하여 최신 기간부터 반환합니다.
///
/// 하락일 분류는 기간 경계를 넘어 이어지는 전일 종가를 기준으로 하므로,
/// 각 기간의 첫날은 직전 기간의 마지막 날과 비교됩니다. 전체 시계열의
/// 첫날만 분류되지 않습니다.
pub fn aggregate_periods(records: &[DailyRecord], period_type: PeriodType) -> Vec<PeriodSummary> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&DailyRecord>)> = Vec::new();
    // 일별 하락 분류 (해당 일자의 그룹에 귀속)
    let mut drops: Vec<Vec<(Option<DropBucket>, Option<DropBucket>)>> = Vec::new();
    let mut prev_close: Option<Price> = None;

    for record in records {
        let key = period_type.key_for(record.date);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            drops.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].1.push(record);

        if let Some(base) = prev_close {
            let close_bucket = percent_change(record.close, base).and_then(classify_drop);
            let low_bucket = percent_change(record.low, base).and_then(classify_drop);
            drops[slot].push((close_bucket, low_bucket));
        }
        prev_close = Some(record.close);
    }

    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by(|&a, &b| groups[a].0.cmp(&groups[b].0));

    let mut summaries = Vec::with_capacity(order.len());
    let mut prev_period_close: Option<Price> = None;

    for slot in order {
        let (key, days) = &groups[slot];
        let (Some(first), Some(last)) = (days.first(), days.last()) else {
            continue;
        };

        let mut summary = PeriodSummary {
            period: key.clone(),
            start_date: first.date,
            end_date: last.date,
            open: first.open,
            high: days.iter().map(|d| d.high).max().unwrap_or(first.high),
            low: days.iter().map(|d| d.low).min().unwrap_or(first.low),
            close: last.close,
            volume: days.iter().map(|d| d.volume).sum(),
            change: prev_period_close.and_then(|base| percent_change(last.close, base)),
            pe: last.pe,
            days: days.len(),
            drop_2pct: DropCount::default(),
            drop_3pct: DropCount::default(),
            drop_4pct: DropCount::default(),
            drop_5pct: DropCount::default(),
        };

        for (close_bucket, low_bucket) in &drops[slot] {
            if let Some(bucket) = close_bucket {
                summary.bucket_mut(*bucket).close += 1;
            }
            if let Some(bucket) = low_bucket {
                summary.bucket_mut(*bucket).low += 1;
            }
        }

        prev_period_close = Some(last.close);
        summaries.push(summary);
    }

    summaries.reverse();
    summaries
}

/// `period_name`을 파싱한 뒤 집계합니다.
///
/// 알 수 없는 기간 이름은 집계 전에 거부됩니다.
pub fn aggregate_by_name(records: &[DailyRecord], period_name: &str) -> StockResult<Vec<PeriodSummary>> {
    let period_type: PeriodType = period_name.parse()?;
    Ok(aggregate_periods(records, period_type))
}
