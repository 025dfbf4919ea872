//! # Stock Core
//!
//! 일봉 주가 시계열의 핵심 도메인 모델과 순수 로직.
//!
//! 캐시/조회 계층이 공유하는 타입을 제공합니다:
//! - 일봉 레코드와 파생 변동률 컬럼
//! - 신선도/커버리지 규칙을 가진 심볼별 조회 메타데이터
//! - 하락일 분류를 포함한 기간 집계
//! - 제공자 기능 트레이트
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
