//! 집계 기간 정의.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StockError;

/// 일봉 시계열 집계 단위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// ISO 주
    Weekly,
    /// 달력 월
    Monthly,
    /// 달력 분기
    Quarterly,
    /// 달력 연도
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Yearly => "yearly",
        }
    }

    /// 거래일의 그룹 키.
    ///
    /// 키는 사전순 정렬이 곧 시간순 정렬입니다:
    /// `2024-W02`, `2024-01`, `2024-Q1`, `2024`.
    pub fn key_for(&self, date: NaiveDate) -> String {
        match self {
            PeriodType::Weekly => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            PeriodType::Monthly => format!("{}-{:02}", date.year(), date.month()),
            PeriodType::Quarterly => {
                format!("{}-Q{}", date.year(), (date.month() - 1) / 3 + 1)
            }
            PeriodType::Yearly => format!("{}", date.year()),
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" | "week" | "w" => Ok(PeriodType::Weekly),
            "monthly" | "month" | "m" => Ok(PeriodType::Monthly),
            "quarterly" | "quarter" | "q" => Ok(PeriodType::Quarterly),
            "yearly" | "year" | "y" => Ok(PeriodType::Yearly),
            _ => Err(StockError::InvalidPeriodType(s.to_string())),
        }
    }
}
