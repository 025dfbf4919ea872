//! 데이터 모듈 오류 타입.

use stock_core::StockError;
use thiserror::Error;

/// 저장소 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 레코드 쓰기 오류
    #[error("Insert error: {0}")]
    InsertError(String),

    /// 스키마 생성 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 저장된 값을 해석할 수 없음
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DataError::ConnectionError(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DataError::InvalidData(err.to_string())
            }
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<DataError> for StockError {
    fn from(err: DataError) -> Self {
        StockError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
