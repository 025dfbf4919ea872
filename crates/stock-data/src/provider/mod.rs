//! 외부 데이터 제공자.
//!
//! ## Yahoo Finance
//! - `YahooDailyProvider`: 일봉 OHLCV 이력 (펀더멘털 없음)
//!
//! 펀더멘털 소스(EPS 이력, 회사명)는 `stock_core::FundamentalsProvider`로
//! 연결합니다.

pub mod yahoo;

pub use yahoo::{quotes_to_records, DailyQuote, YahooDailyProvider, YAHOO_PROVIDER_ID};
