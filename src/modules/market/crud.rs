use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{MySql, Pool, QueryBuilder};

use super::interface::{MarketError, MarketRepository, Result};
use super::model::{MarketRecord, MergeBatch, TableStats};
use crate::modules::task::model::TaskKey;

/// Rows per multi-row statement; 17 binds per row stays well under MySQL's
/// placeholder limit.
const CHUNK_SIZE: usize = 500;

const MARKET_COLUMNS: &str = "market_id, kind, quantity, quality, price, \
    seller_id, seller_name, seller_realm_id, seller_certificates, seller_contest_wins, \
    seller_is_npc, fees, posted_time, batch_id, data_version, is_valid, data_source";

pub struct MarketCrud {
    pool: Pool<MySql>,
}

impl MarketCrud {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM information_schema.tables
            WHERE table_schema = DATABASE() AND table_name = ?
            "#,
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

#[async_trait]
impl MarketRepository for MarketCrud {
    async fn ensure_table(&self, key: TaskKey) -> Result<()> {
        let table = key.table_name();

        // Table names are derived from two integers, never from user text.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                market_id BIGINT NOT NULL,
                kind INT NOT NULL,
                quantity BIGINT NOT NULL,
                quality INT NOT NULL,
                price DECIMAL(10,3) NOT NULL,
                seller_id BIGINT NOT NULL,
                seller_name VARCHAR(100) NOT NULL,
                seller_realm_id INT NOT NULL,
                seller_certificates INT NOT NULL DEFAULT 0,
                seller_contest_wins INT NOT NULL DEFAULT 0,
                seller_is_npc TINYINT(1) NOT NULL DEFAULT 0,
                fees BIGINT NOT NULL DEFAULT 0,
                posted_time DATETIME NOT NULL,
                batch_id BIGINT NOT NULL,
                data_version INT NOT NULL DEFAULT 1,
                is_valid TINYINT(1) NOT NULL DEFAULT 1,
                data_source VARCHAR(50) NOT NULL DEFAULT 'api',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NULL DEFAULT NULL ON UPDATE CURRENT_TIMESTAMP,
                KEY idx_seller_id (seller_id),
                KEY idx_posted_time (posted_time),
                KEY idx_batch_id (batch_id),
                UNIQUE KEY uk_market_id (market_id)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
            "#
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(table = %table, "Market table ready");
        Ok(())
    }

    async fn existing_versions(&self, key: TaskKey, market_ids: &[i64]) -> Result<HashMap<i64, i32>> {
        if market_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let table = key.table_name();
        let mut versions = HashMap::with_capacity(market_ids.len());

        for chunk in market_ids.chunks(CHUNK_SIZE * 10) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
                "SELECT market_id, data_version FROM {table} WHERE market_id IN ("
            ));
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            builder.push(")");

            let rows: Vec<(i64, i32)> = builder.build_query_as().fetch_all(&self.pool).await?;
            versions.extend(rows);
        }

        Ok(versions)
    }

    async fn apply_batch(&self, key: TaskKey, batch: &MergeBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let table = key.table_name();
        let mut tx = self.pool.begin().await?;

        // Known rows are rewritten through the unique key on market_id; only
        // the mutable columns change on the duplicate path.
        for chunk in batch.updates.chunks(CHUNK_SIZE) {
            let mut builder = insert_builder(&table, chunk);
            builder.push(
                " ON DUPLICATE KEY UPDATE \
                 quantity = VALUES(quantity), \
                 quality = VALUES(quality), \
                 price = VALUES(price), \
                 seller_certificates = VALUES(seller_certificates), \
                 seller_contest_wins = VALUES(seller_contest_wins), \
                 fees = VALUES(fees), \
                 posted_time = VALUES(posted_time), \
                 batch_id = VALUES(batch_id), \
                 data_version = VALUES(data_version), \
                 updated_at = NOW()",
            );

            builder.build().execute(&mut *tx).await?;
        }

        for chunk in batch.inserts.chunks(CHUNK_SIZE) {
            let mut builder = insert_builder(&table, chunk);
            builder.build().execute(&mut *tx).await.map_err(|e| {
                if is_duplicate_key(&e) {
                    let id = chunk.first().map(|r| r.market_id).unwrap_or_default();
                    MarketError::DuplicateMarketId(id)
                } else {
                    MarketError::Database(e)
                }
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_record(&self, key: TaskKey, market_id: i64) -> Result<Option<MarketRecord>> {
        let table = key.table_name();
        let record = sqlx::query_as::<_, MarketRecord>(&format!(
            "SELECT {MARKET_COLUMNS} FROM {table} WHERE market_id = ?"
        ))
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn table_stats(&self, key: TaskKey) -> Result<TableStats> {
        let table = key.table_name();
        if !self.table_exists(&table).await? {
            return Err(MarketError::MissingTable(table));
        }

        let stats = sqlx::query_as::<_, (i64, i64, i64, Option<chrono::DateTime<chrono::Utc>>)>(
            &format!(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(DISTINCT batch_id),
                    (SELECT COUNT(*) FROM {table} WHERE batch_id = (SELECT MAX(batch_id) FROM {table})),
                    MAX(updated_at)
                FROM {table}
                "#
            ),
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TableStats {
            total_count: stats.0,
            batch_count: stats.1,
            last_batch_count: stats.2,
            last_update_time: stats.3,
        })
    }
}

fn insert_builder<'a>(table: &str, records: &'a [MarketRecord]) -> QueryBuilder<'a, MySql> {
    let mut builder: QueryBuilder<MySql> =
        QueryBuilder::new(format!("INSERT INTO {table} ({MARKET_COLUMNS}) "));
    builder.push_values(records, |mut row, record| {
        row.push_bind(record.market_id)
            .push_bind(record.kind)
            .push_bind(record.quantity)
            .push_bind(record.quality)
            .push_bind(record.price)
            .push_bind(record.seller_id)
            .push_bind(&record.seller_name)
            .push_bind(record.seller_realm_id)
            .push_bind(record.seller_certificates)
            .push_bind(record.seller_contest_wins)
            .push_bind(record.seller_is_npc)
            .push_bind(record.fees)
            .push_bind(record.posted_time)
            .push_bind(record.batch_id)
            .push_bind(record.data_version)
            .push_bind(record.is_valid)
            .push_bind(&record.data_source);
    });
    builder
}

fn is_duplicate_key(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
