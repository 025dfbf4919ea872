//! 설정 관리.
//!
//! TOML 설정 파일(선택)을 읽은 뒤 `STOCK__SECTION__KEY` 형식의 환경 변수로
//! 덮어씁니다. 예: `STOCK__PROVIDER__TIMEOUT_SECS=10`

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 로컬 캐시 설정
    pub cache: CacheConfig,
    /// 외부 데이터 제공자 설정
    pub provider: ProviderConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 로컬 캐시 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 캐시 사용 여부 (false면 모든 요청이 제공자로 전달됨)
    pub enabled: bool,
    /// DB 파일 경로. `None`이면 실행 환경에서 자동 감지
    pub db_path: Option<String>,
    /// SQLite 커넥션 풀 크기
    pub max_connections: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
            max_connections: 4,
        }
    }
}

/// 캐시를 끄는 경로 값인지 확인.
fn is_disabled_path(path: &str) -> bool {
    let trimmed = path.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none")
}

impl CacheConfig {
    /// DB 경로를 결정합니다. 캐시가 꺼져 있으면 `None`.
    ///
    /// 우선순위:
    /// - `enabled = false` → 비활성
    /// - 설정의 `db_path` (`""` 또는 `"none"`이면 비활성)
    /// - `DB_PATH` 환경 변수 (동일 규칙)
    /// - AWS Lambda → `/tmp/cache.db`
    /// - `/data` 디렉토리 존재 (컨테이너 볼륨) → `/data/cache.db`
    /// - 작업 디렉토리의 `cache.db`
    pub fn resolve_db_path(&self) -> Option<String> {
        self.resolve_db_path_with(
            |key| std::env::var(key).ok(),
            Path::new("/data").is_dir(),
        )
    }

    fn resolve_db_path_with<F>(&self, env: F, data_dir_exists: bool) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.enabled {
            return None;
        }

        if let Some(path) = &self.db_path {
            return (!is_disabled_path(path)).then(|| path.clone());
        }

        if let Some(path) = env("DB_PATH") {
            return (!is_disabled_path(&path)).then_some(path);
        }

        if env("AWS_LAMBDA_FUNCTION_NAME").is_some_and(|name| !name.is_empty()) {
            return Some("/tmp/cache.db".to_string());
        }

        if data_dir_exists {
            return Some("/data/cache.db".to_string());
        }

        Some("cache.db".to_string())
    }
}

/// 외부 데이터 제공자 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// 제공자 호출 1회 제한 시간 (초)
    pub timeout_secs: u64,
    /// 항상 대체 제공자로 조회하는 심볼 접미사
    pub alternate_suffixes: Vec<String>,
    /// 증분 조회 구간에 더하는 여유 일수
    pub stale_margin_days: i64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            alternate_suffixes: vec![".HK".to_string()],
            stale_margin_days: 5,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 접미사 기준으로 대체 제공자에 고정된 심볼인지 확인.
    pub fn pins_alternate(&self, symbol: &str) -> bool {
        let upper = symbol.to_uppercase();
        self.alternate_suffixes
            .iter()
            .any(|suffix| upper.ends_with(&suffix.to_uppercase()))
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 포맷 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// 로깅 모듈 설정으로 변환. 알 수 없는 포맷은 pretty로 처리합니다.
    pub fn to_log_config(&self) -> crate::logging::LogConfig {
        crate::logging::LogConfig::new(self.level.clone())
            .with_format(self.format.parse().unwrap_or_default())
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix("STOCK")
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    /// 설정 파일을 읽고 환경 변수로 덮어씁니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// 기본값에 환경 변수만 적용합니다.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }
}
