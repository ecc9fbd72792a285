//! Multi-row upsert writer
//!
//! A batch becomes one statement:
//!
//! ```sql
//! INSERT INTO t (a, b, c) VALUES (?, ?, ?), (?, ?, ?), ...
//! ON CONFLICT (a) DO UPDATE SET b = excluded.b, c = excluded.c, updated_at = CURRENT_TIMESTAMP
//! ```
//!
//! A single statement is atomic in SQLite, so a batch lands or fails as a whole.

use crate::fields::SqlValue;
use crate::tables::TableSpec;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Row values in the order of `TableSpec::columns`
pub type RowValues = Vec<SqlValue>;

pub struct BatchWriter<'a> {
    pool: &'a SqlitePool,
    spec: &'static TableSpec,
    insert_prefix: String,
    conflict_clause: String,
}

impl<'a> BatchWriter<'a> {
    pub fn new(pool: &'a SqlitePool, spec: &'static TableSpec) -> Self {
        let columns: Vec<&str> = spec.dest_columns().collect();
        let insert_prefix = format!("INSERT INTO {} ({}) ", spec.table, columns.join(", "));

        let mut assignments: Vec<String> = spec
            .update_columns()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        assignments.push("updated_at = CURRENT_TIMESTAMP".to_string());

        let conflict_clause = format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            spec.key_columns.join(", "),
            assignments.join(", ")
        );

        Self {
            pool,
            spec,
            insert_prefix,
            conflict_clause,
        }
    }

    pub fn table(&self) -> &'static str {
        self.spec.table
    }

    /// Upsert a batch, returning the number of rows written
    pub async fn upsert(&self, rows: &[RowValues]) -> sqlx::Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(&self.insert_prefix);
        builder.push_values(rows, |mut b, row| {
            for value in row {
                match value {
                    SqlValue::Null => b.push_bind(None::<String>),
                    SqlValue::Text(s) => b.push_bind(s.clone()),
                    SqlValue::Real(v) => b.push_bind(*v),
                    SqlValue::Integer(v) => b.push_bind(*v),
                    SqlValue::Bool(v) => b.push_bind(*v),
                };
            }
        });
        builder.push(&self.conflict_clause);

        let result = builder.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Current row count of the destination table
    pub async fn row_count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.spec.table))
            .fetch_one(self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::MONTHLY_METRICS;

    #[tokio::test]
    async fn test_conflict_clause_lists_non_key_columns() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let writer = BatchWriter::new(&pool, &MONTHLY_METRICS);

        assert!(writer
            .insert_prefix
            .starts_with("INSERT INTO monthly_metrics (uei, month, total_revenue"));
        assert!(writer.conflict_clause.starts_with(" ON CONFLICT (uei, month) DO UPDATE SET"));
        assert!(writer.conflict_clause.contains("total_revenue = excluded.total_revenue"));
        assert!(!writer.conflict_clause.contains("uei = excluded.uei"));
        assert!(writer.conflict_clause.ends_with("updated_at = CURRENT_TIMESTAMP"));
    }
}
