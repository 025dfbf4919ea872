//! 일봉 시계열, 조회 메타데이터, 제공자 도메인 모델.

mod aggregation;
mod daily;
mod meta;
mod provider;

pub use aggregation::*;
pub use daily::*;
pub use meta::*;
pub use provider::*;
