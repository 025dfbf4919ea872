//! 축약 표기(`"12.34M"`)를 지원하는 거래량 타입.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use super::decimal::DecimalExt;

const THOUSAND: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);
const MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
const BILLION: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// 거래량 (주 단위).
///
/// 내부적으로는 원본 주식 수를 보관합니다. [`fmt::Display`]는 소수 둘째 자리까지
/// 반올림한 축약 표기를 출력하고 [`FromStr`]은 그 표기를 다시 읽습니다.
/// 캐시는 축약 표기로 저장하므로 1,234,567주는 `"1.23M"`, 즉 1,230,000주로
/// 복원됩니다. 표시 값은 유지되지만 원본 정밀도는 유지되지 않습니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Volume(Decimal);

impl Volume {
    pub const ZERO: Volume = Volume(Decimal::ZERO);

    pub fn new(shares: Decimal) -> Self {
        Self(shares)
    }

    pub fn from_shares(shares: u64) -> Self {
        Self(Decimal::from(shares))
    }

    /// 원본 주식 수.
    pub fn shares(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        if v >= BILLION {
            write!(f, "{}B", (v / BILLION).to_price_string())
        } else if v >= MILLION {
            write!(f, "{}M", (v / MILLION).to_price_string())
        } else if v >= THOUSAND {
            write!(f, "{}K", (v / THOUSAND).to_price_string())
        } else {
            write!(
                f,
                "{}",
                v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            )
        }
    }
}

/// 숫자 + 선택적 K/M/B 접미사 형식이 아닌 거래량 문자열 오류.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid volume: {0:?}")]
pub struct ParseVolumeError(String);

impl FromStr for Volume {
    type Err = ParseVolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Volume::ZERO);
        }

        let (number, multiplier) = match trimmed.chars().last() {
            Some('B') | Some('b') => (&trimmed[..trimmed.len() - 1], BILLION),
            Some('M') | Some('m') => (&trimmed[..trimmed.len() - 1], MILLION),
            Some('K') | Some('k') => (&trimmed[..trimmed.len() - 1], THOUSAND),
            _ => (trimmed, Decimal::ONE),
        };

        number
            .trim()
            .parse::<Decimal>()
            .map(|n| Volume(n * multiplier))
            .map_err(|_| ParseVolumeError(s.to_string()))
    }
}

impl Add for Volume {
    type Output = Volume;

    fn add(self, rhs: Volume) -> Volume {
        Volume(self.0 + rhs.0)
    }
}

impl Sum for Volume {
    fn sum<I: Iterator<Item = Volume>>(iter: I) -> Volume {
        iter.fold(Volume::ZERO, Add::add)
    }
}

impl Serialize for Volume {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Volume {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
