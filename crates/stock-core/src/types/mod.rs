//! 주가 시계열 시스템 공통 타입.

mod decimal;
mod period;
mod volume;

pub use decimal::*;
pub use period::*;
pub use volume::*;
