//! SQL control plane over the database's MySQL wire protocol: `SHOW
//! DATABASES`, `DESCRIBE`, `TRUNCATE`, DDL execution, column widening, row
//! insertion, and row counting, all over a pooled `sqlx` connection.

use async_trait::async_trait;
use etl_core::{DbControl, LiveColumn, LoadError};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool, Row};
use std::time::Duration;

pub struct SqlxDbControl {
    pool: Pool<MySql>,
}

impl SqlxDbControl {
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: &str,
        pool_min: u32,
        pool_max: u32,
        recycle_secs: u64,
    ) -> Result<Self, LoadError> {
        let url = format!("mysql://{user}:{password}@{host}:{port}/{database}");
        let pool = MySqlPoolOptions::new()
            .min_connections(pool_min)
            .max_connections(pool_max)
            .max_lifetime(Duration::from_secs(recycle_secs))
            .test_before_acquire(true)
            .connect(&url)
            .await
            .map_err(|e| LoadError::TruncateFailed(format!("connect failed: {e}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DbControl for SqlxDbControl {
    async fn show_databases(&self) -> Result<Vec<String>, LoadError> {
        let rows = sqlx::query("SHOW DATABASES")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LoadError::TruncateFailed(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn describe_table(&self, database: &str, table: &str) -> Result<Vec<LiveColumn>, LoadError> {
        let sql = "SELECT ordinal_position, column_name, data_type, is_nullable, character_maximum_length \
                    FROM information_schema.columns \
                    WHERE table_schema = ? AND table_name = ? \
                    ORDER BY ordinal_position";
        let rows = sqlx::query(sql)
            .bind(database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LoadError::SchemaDrift {
                table: table.to_string(),
                message: e.to_string(),
            })?;

        Ok(rows
            .iter()
            .map(|row| LiveColumn {
                ordinal_position: row.get::<i64, _>(0) as u32,
                column_name: row.get(1),
                data_type: row.get(2),
                is_nullable: row.get::<String, _>(3).eq_ignore_ascii_case("yes"),
                character_maximum_length: row
                    .try_get::<Option<i64>, _>(4)
                    .ok()
                    .flatten()
                    .map(|v| v as u32),
            })
            .collect())
    }

    async fn truncate_table(&self, database: &str, table: &str) -> Result<(), LoadError> {
        let sql = format!("TRUNCATE TABLE `{database}`.`{table}`");
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| LoadError::TruncateFailed(format!("{table}: {e}")))?;
        Ok(())
    }

    async fn execute_ddl(&self, ddl: &str) -> Result<(), LoadError> {
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| LoadError::TruncateFailed(e.to_string()))?;
        Ok(())
    }

    async fn alter_widen_column(
        &self,
        database: &str,
        table: &str,
        column: &str,
        new_width: u32,
    ) -> Result<(), LoadError> {
        let sql = format!(
            "ALTER TABLE `{database}`.`{table}` MODIFY COLUMN `{column}` VARCHAR({new_width})"
        );
        sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            tracing::warn!(table, column, error = %e, "widen failed");
            LoadError::Overflow {
                column: column.to_string(),
                declared: new_width as usize,
            }
        })?;
        Ok(())
    }

    async fn insert_rows(&self, database: &str, table: &str, sql: &str) -> Result<u64, LoadError> {
        let full = format!("INSERT INTO `{database}`.`{table}` {sql}");
        let result = sqlx::query(&full)
            .execute(&self.pool)
            .await
            .map_err(|e| LoadError::TruncateFailed(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn count_rows(&self, database: &str, table: &str) -> Result<u64, LoadError> {
        let sql = format!("SELECT COUNT(*) FROM `{database}`.`{table}`");
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LoadError::TruncateFailed(e.to_string()))?;
        Ok(row.get::<i64, _>(0) as u64)
    }
}
