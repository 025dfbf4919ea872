//! SQLite 기반 일봉 캐시.
//!
//! 심볼별 일봉 원본 행과 심볼별 조회 기록(fetch log)을 저장합니다.
//! 가격은 소수 둘째 자리 표시 문자열로 저장하므로 캐시된 시계열은 조회
//! 당시와 똑같이 표시됩니다. 파생 변동률 컬럼은 저장하지 않으며
//! [`FreshnessCache::get_range`]가 다시 계산합니다.
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! use stock_data::FreshnessCache;
//!
//! let cache = FreshnessCache::connect("cache.db", 4).await?;
//! if let Some(meta) = cache.get_meta("AAPL").await? {
//!     let rows = cache.get_range("AAPL", meta.earliest_date, meta.latest_date).await?;
//! }
//! ```

use crate::error::{DataError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use stock_core::{derive_changes, parse_price, DailyRecord, DecimalExt, FetchMeta, Volume, DATE_FORMAT};
use tracing::{debug, info, instrument};

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS daily_prices (
        symbol TEXT NOT NULL,
        date   TEXT NOT NULL,
        open   TEXT NOT NULL,
        high   TEXT NOT NULL,
        low    TEXT NOT NULL,
        close  TEXT NOT NULL,
        volume TEXT NOT NULL,
        pe     TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (symbol, date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fetch_log (
        symbol        TEXT PRIMARY KEY,
        source        TEXT NOT NULL,
        company_name  TEXT NOT NULL DEFAULT '',
        ttm_eps       TEXT NOT NULL DEFAULT '0',
        last_fetched  TEXT NOT NULL,
        latest_date   TEXT NOT NULL,
        earliest_date TEXT NOT NULL
    )
    "#,
];

/// `daily_prices` 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct DailyPriceRow {
    pub symbol: String,
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub pe: String,
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| DataError::InvalidData(format!("date {:?}: {}", value, e)))
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal> {
    value
        .trim()
        .parse::<Decimal>()
        .map_err(|e| DataError::InvalidData(format!("{} {:?}: {}", column, value, e)))
}

impl DailyPriceRow {
    /// 도메인 레코드로 변환. 파생 컬럼은 비워 둡니다.
    pub fn to_record(&self) -> Result<DailyRecord> {
        let volume = self
            .volume
            .parse::<Volume>()
            .map_err(|e| DataError::InvalidData(e.to_string()))?;
        let pe = parse_price(&self.pe)
            .map_err(|e| DataError::InvalidData(format!("pe {:?}: {}", self.pe, e)))?;

        Ok(DailyRecord::new(
            self.symbol.clone(),
            parse_date(&self.date)?,
            parse_decimal("open", &self.open)?,
            parse_decimal("high", &self.high)?,
            parse_decimal("low", &self.low)?,
            parse_decimal("close", &self.close)?,
            volume,
        )
        .with_pe(pe))
    }
}

/// `fetch_log` 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct FetchLogRow {
    pub symbol: String,
    pub source: String,
    pub company_name: String,
    pub ttm_eps: String,
    pub last_fetched: String,
    pub latest_date: String,
    pub earliest_date: String,
}

impl FetchLogRow {
    pub fn to_meta(&self) -> Result<FetchMeta> {
        let last_fetched = DateTime::parse_from_rfc3339(&self.last_fetched)
            .map_err(|e| DataError::InvalidData(format!("last_fetched {:?}: {}", self.last_fetched, e)))?
            .with_timezone(&Utc);

        Ok(FetchMeta {
            symbol: self.symbol.clone(),
            source: self.source.clone(),
            company_name: self.company_name.clone(),
            ttm_eps: parse_decimal("ttm_eps", &self.ttm_eps)?,
            last_fetched,
            latest_date: parse_date(&self.latest_date)?,
            earliest_date: parse_date(&self.earliest_date)?,
        })
    }
}

/// SQLite 기반 일봉 캐시.
#[derive(Debug, Clone)]
pub struct FreshnessCache {
    pool: SqlitePool,
}

impl FreshnessCache {
    /// 기존 풀을 감쌉니다. 스키마가 이미 있어야 합니다 ([`Self::migrate`] 참고).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `path`의 DB 파일을 열고(없으면 생성) 스키마를 적용합니다.
    pub async fn connect(path: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| DataError::ConnectionError(format!("{}: {}", path, e)))?;

        let cache = Self::new(pool);
        cache.migrate().await?;
        info!(path = path, "일봉 캐시 열림");
        Ok(cache)
    }

    /// 단일 커넥션 인메모리 캐시. 데이터는 풀이 살아 있는 동안만 유지됩니다.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        let cache = Self::new(pool);
        cache.migrate().await?;
        Ok(cache)
    }

    /// 테이블이 없으면 생성합니다.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DataError::MigrationError(e.to_string()))?;
        }
        Ok(())
    }

    /// 심볼의 조회 메타데이터 (조회한 적이 있을 때만).
    #[instrument(skip(self))]
    pub async fn get_meta(&self, symbol: &str) -> Result<Option<FetchMeta>> {
        let row: Option<FetchLogRow> = sqlx::query_as(
            r#"
            SELECT symbol, source, company_name, ttm_eps, last_fetched, latest_date, earliest_date
            FROM fetch_log
            WHERE symbol = ?
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        row.map(|r| r.to_meta()).transpose()
    }

    /// `[start, end]` 구간의 캐시 행을 최신순으로, 변동률을 계산해 반환합니다.
    ///
    /// 계산은 `start`부터 시작하므로 더 오래된 이력이 캐시에 있어도 반환된
    /// 가장 오래된 행의 변동률은 비어 있습니다.
    #[instrument(skip(self))]
    pub async fn get_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>> {
        let rows: Vec<DailyPriceRow> = sqlx::query_as(
            r#"
            SELECT symbol, date, open, high, low, close, volume, pe
            FROM daily_prices
            WHERE symbol = ? AND date >= ? AND date <= ?
            ORDER BY date ASC
            "#,
        )
        .bind(symbol)
        .bind(start.format(DATE_FORMAT).to_string())
        .bind(end.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        let mut records = rows
            .iter()
            .map(DailyPriceRow::to_record)
            .collect::<Result<Vec<_>>>()?;

        derive_changes(&mut records);
        records.reverse();

        debug!(symbol = symbol, count = records.len(), "캐시 일봉 구간 조회");
        Ok(records)
    }

    /// 하나의 트랜잭션으로 모든 레코드를 upsert합니다 (전부 성공 또는 전부 실패).
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn store_records(&self, symbol: &str, records: &[DailyRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let stored = insert_records(&mut *tx, symbol, records).await?;
        tx.commit()
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

        Ok(stored)
    }

    /// `meta.symbol`의 조회 기록을 upsert합니다.
    #[instrument(skip(self, meta), fields(symbol = %meta.symbol))]
    pub async fn update_meta(&self, meta: &FetchMeta) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_meta(&mut *conn, meta).await
    }

    /// 레코드와 조회 기록을 하나의 트랜잭션으로 저장합니다.
    #[instrument(skip(self, records, meta), fields(symbol = %meta.symbol, count = records.len()))]
    pub async fn store_fetch(&self, records: &[DailyRecord], meta: &FetchMeta) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let stored = insert_records(&mut *tx, &meta.symbol, records).await?;
        upsert_meta(&mut *tx, meta).await?;
        tx.commit()
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

        debug!(stored = stored, "조회 데이터 및 조회 기록 저장");
        Ok(stored)
    }

    /// 심볼의 캐시 행 수.
    pub async fn count(&self, symbol: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_prices WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_records(
    conn: &mut SqliteConnection,
    symbol: &str,
    records: &[DailyRecord],
) -> Result<usize> {
    let mut stored = 0;
    for record in records {
        let pe = record.pe.map(|v| v.to_price_string()).unwrap_or_default();
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO daily_prices (symbol, date, open, high, low, close, volume, pe)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(symbol)
        .bind(record.date.format(DATE_FORMAT).to_string())
        .bind(record.open.to_price_string())
        .bind(record.high.to_price_string())
        .bind(record.low.to_price_string())
        .bind(record.close.to_price_string())
        .bind(record.volume.to_string())
        .bind(pe)
        .execute(&mut *conn)
        .await
        .map_err(|e| DataError::InsertError(e.to_string()))?;

        stored += result.rows_affected() as usize;
    }
    Ok(stored)
}

async fn upsert_meta(conn: &mut SqliteConnection, meta: &FetchMeta) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO fetch_log
            (symbol, source, company_name, ttm_eps, last_fetched, latest_date, earliest_date)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&meta.symbol)
    .bind(&meta.source)
    .bind(&meta.company_name)
    .bind(meta.ttm_eps.to_string())
    .bind(meta.last_fetched.to_rfc3339())
    .bind(meta.latest_date.format(DATE_FORMAT).to_string())
    .bind(meta.earliest_date.format(DATE_FORMAT).to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| DataError::InsertError(e.to_string()))?;

    Ok(())
}
