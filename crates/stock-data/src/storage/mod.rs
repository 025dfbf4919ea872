//! 영속 저장소.
//!
//! - `daily`: SQLite 일봉 행과 심볼별 조회 기록

pub mod daily;

pub use daily::{DailyPriceRow, FetchLogRow, FreshnessCache};
