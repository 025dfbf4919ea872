//! 심볼별 조회 메타데이터.

use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 한 심볼의 마지막 성공 조회 기록.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMeta {
    pub symbol: String,
    /// 마지막 조회를 처리한 제공자 ID
    pub source: String,
    pub company_name: String,
    /// TTM EPS (모르면 0)
    pub ttm_eps: Decimal,
    pub last_fetched: DateTime<Utc>,
    /// 캐시에 있는 가장 최근 거래일
    pub latest_date: NaiveDate,
    /// 캐시가 커버하는 가장 오래된 날짜
    pub earliest_date: NaiveDate,
}

impl FetchMeta {
    /// 마지막 조회가 `now`와 같은 로컬 달력 날짜이면 true.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.last_fetched.with_timezone(&Local).date_naive() == now.with_timezone(&Local).date_naive()
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// 캐시 이력이 `start`까지 거슬러 올라가면 true.
    pub fn covers_range(&self, start: NaiveDate) -> bool {
        self.earliest_date <= start
    }

    /// 마지막 조회 후 경과한 일수 (음수 없음).
    pub fn days_since_fetch(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_fetched).num_days().max(0)
    }

    /// 이전 조회의 더 오래된 `earliest_date`를 유지합니다.
    ///
    /// 증분 조회는 최근 며칠만 반환하므로 이력 구간은 넓어지기만 해야 합니다.
    pub fn widen_from(mut self, previous: Option<&FetchMeta>) -> Self {
        if let Some(prev) = previous {
            self.earliest_date = self.earliest_date.min(prev.earliest_date);
            self.latest_date = self.latest_date.max(prev.latest_date);
        }
        self
    }
}
