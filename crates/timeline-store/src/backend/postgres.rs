//! PostgreSQL backend.
//!
//! One pool serves every logical database; each [`PgBackend`] is a namespace
//! over the shared `kv_*` tables. Single-statement upserts give the same
//! per-call atomicity the store relies on from the memory backend.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use timeline_core::Score;

use super::{Backend, ScoreBound, Scored};
use crate::error::StoreResult;

/// Namespaced [`Backend`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
    namespace: String,
}

impl PgBackend {
    /// Creates a backend for `namespace` on an existing pool.
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    /// Namespace this backend reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Escapes LIKE metacharacters so user text matches literally.
fn like_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

fn scored(rows: Vec<(String, i64)>) -> Vec<Scored> {
    rows.into_iter()
        .map(|(member, score)| (member, Score::from_nanos(score)))
        .collect()
}

#[async_trait]
impl Backend for PgBackend {
    // ==================== Strings ====================

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value FROM kv_strings
            WHERE namespace = $1 AND key = $2
            AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_strings (namespace, key, value, expires_at)
            VALUES ($1, $2, $3, NULL)
            ON CONFLICT (namespace, key)
            DO UPDATE SET value = EXCLUDED.value, expires_at = NULL
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM kv_strings
                WHERE namespace = $1 AND key = $2
                AND (expires_at IS NULL OR expires_at > NOW())
            )
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for statement in [
            "DELETE FROM kv_strings WHERE namespace = $1 AND key = $2",
            "DELETE FROM kv_hashes WHERE namespace = $1 AND key = $2",
            "DELETE FROM kv_sets WHERE namespace = $1 AND key = $2",
            "DELETE FROM kv_zsets WHERE namespace = $1 AND key = $2",
        ] {
            removed += sqlx::query(statement)
                .bind(&self.namespace)
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE kv_strings
            SET expires_at = NOW() + make_interval(secs => $3)
            WHERE namespace = $1 AND key = $2
            AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE kv_strings SET expires_at = NULL
            WHERE namespace = $1 AND key = $2
            AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== Hashes ====================

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM kv_hashes WHERE namespace = $1 AND key = $2 AND field = $3",
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(field)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_hashes (namespace, key, field, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (namespace, key, field) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn hset_many(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let (names, values): (Vec<&str>, Vec<&str>) = fields
            .iter()
            .map(|(f, v)| (f.as_str(), v.as_str()))
            .unzip();

        sqlx::query(
            r#"
            INSERT INTO kv_hashes (namespace, key, field, value)
            SELECT $1, $2, f, v FROM UNNEST($3::text[], $4::text[]) AS t(f, v)
            ON CONFLICT (namespace, key, field) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(names)
        .bind(values)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM kv_hashes WHERE namespace = $1 AND key = $2 AND field = $3")
                .bind(&self.namespace)
                .bind(key)
                .bind(field)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT field, value FROM kv_hashes WHERE namespace = $1 AND key = $2 ORDER BY field",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ==================== Sets ====================

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_sets (namespace, key, member) VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(member)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM kv_sets WHERE namespace = $1 AND key = $2 AND member = $3")
                .bind(&self.namespace)
                .bind(key)
                .bind(member)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT member FROM kv_sets WHERE namespace = $1 AND key = $2 ORDER BY member",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(m,)| m).collect())
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM kv_sets WHERE namespace = $1 AND key = $2")
                .bind(&self.namespace)
                .bind(key)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0.max(0) as u64)
    }

    async fn spop(&self, key: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            DELETE FROM kv_sets
            WHERE (namespace, key, member) IN (
                SELECT namespace, key, member FROM kv_sets
                WHERE namespace = $1 AND key = $2
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING member
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(m,)| m))
    }

    // ==================== Ordered collections ====================

    async fn zadd(&self, key: &str, member: &str, score: Score) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_zsets (namespace, key, member, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (namespace, key, member) DO UPDATE SET score = EXCLUDED.score
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(member)
        .bind(score.as_nanos())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn zadd_nx(&self, key: &str, member: &str, score: Score) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_zsets (namespace, key, member, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (namespace, key, member) DO NOTHING
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(member)
        .bind(score.as_nanos())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM kv_zsets WHERE namespace = $1 AND key = $2 AND member = $3")
                .bind(&self.namespace)
                .bind(key)
                .bind(member)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<Score>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT score FROM kv_zsets WHERE namespace = $1 AND key = $2 AND member = $3",
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(member)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(s,)| Score::from_nanos(s)))
    }

    async fn zincrby(&self, key: &str, member: &str, delta: i64) -> StoreResult<Score> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO kv_zsets (namespace, key, member, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (namespace, key, member)
            DO UPDATE SET score = kv_zsets.score + EXCLUDED.score
            RETURNING score
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(member)
        .bind(delta)
        .fetch_one(&self.pool)
        .await?;

        Ok(Score::from_nanos(row.0))
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM kv_zsets WHERE namespace = $1 AND key = $2")
                .bind(&self.namespace)
                .bind(key)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0.max(0) as u64)
    }

    async fn zrange(
        &self,
        key: &str,
        offset: usize,
        count: Option<usize>,
    ) -> StoreResult<Vec<Scored>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT member, score FROM kv_zsets
            WHERE namespace = $1 AND key = $2
            ORDER BY score ASC, member ASC
            OFFSET $3
            LIMIT $4
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .bind(limit_param(count))
        .fetch_all(&self.pool)
        .await?;

        Ok(scored(rows))
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Scored>> {
        let Some((lo, hi)) = ScoreBound::interval(min, max) else {
            return Ok(Vec::new());
        };
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT member, score FROM kv_zsets
            WHERE namespace = $1 AND key = $2
            AND score >= $3 AND score <= $4
            ORDER BY score ASC, member ASC
            LIMIT $5
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(lo)
        .bind(hi)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(scored(rows))
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: ScoreBound,
        min: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Scored>> {
        let Some((lo, hi)) = ScoreBound::interval(min, max) else {
            return Ok(Vec::new());
        };
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT member, score FROM kv_zsets
            WHERE namespace = $1 AND key = $2
            AND score >= $3 AND score <= $4
            ORDER BY score DESC, member DESC
            LIMIT $5
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(lo)
        .bind(hi)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(scored(rows))
    }

    // ==================== Keyspace ====================

    async fn keys_matching(&self, contains: &str, suffix: &str) -> StoreResult<Vec<String>> {
        let pattern = format!("%{}%{}", like_literal(contains), like_literal(suffix));
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT key FROM kv_strings
                WHERE namespace = $1 AND key LIKE $2
                AND (expires_at IS NULL OR expires_at > NOW())
            UNION SELECT key FROM kv_hashes WHERE namespace = $1 AND key LIKE $2
            UNION SELECT key FROM kv_sets WHERE namespace = $1 AND key LIKE $2
            UNION SELECT key FROM kv_zsets WHERE namespace = $1 AND key LIKE $2
            ORDER BY key
            "#,
        )
        .bind(&self.namespace)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in [
            "DELETE FROM kv_strings WHERE namespace = $1",
            "DELETE FROM kv_hashes WHERE namespace = $1",
            "DELETE FROM kv_sets WHERE namespace = $1",
            "DELETE FROM kv_zsets WHERE namespace = $1",
        ] {
            sqlx::query(statement)
                .bind(&self.namespace)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(namespace = %self.namespace, "Flushed namespace");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}


#[cfg(all(test, feature = "integration-tests"))]
mod integration_tests {
    use super::*;
    use crate::schema;

    async fn backend(namespace: &str) -> PgBackend {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("connect");
        schema::run_migrations(&pool).await.expect("migrations");
        let backend = PgBackend::new(pool, namespace);
        backend.flush().await.expect("flush");
        backend
    }

    #[tokio::test]
    async fn test_zset_window_scans() {
        let b = backend("it_zset").await;
        for (m, s) in [("a", 10), ("b", 20), ("c", 30)] {
            b.zadd("z", m, Score::from_nanos(s)).await.unwrap();
        }
        assert!(!b.zadd_nx("z", "a", Score::from_nanos(99)).await.unwrap());

        let up = b
            .zrange_by_score(
                "z",
                ScoreBound::Inclusive(Score::from_nanos(20)),
                ScoreBound::Unbounded,
                Some(1),
            )
            .await
            .unwrap();
        assert_eq!(up, vec![("b".to_string(), Score::from_nanos(20))]);

        let down = b
            .zrevrange_by_score(
                "z",
                ScoreBound::Exclusive(Score::from_nanos(20)),
                ScoreBound::Unbounded,
                None,
            )
            .await
            .unwrap();
        assert_eq!(down, vec![("a".to_string(), Score::from_nanos(10))]);
    }

    #[tokio::test]
    async fn test_strings_and_expiry() {
        let b = backend("it_strings").await;
        b.set("k", "v").await.unwrap();
        assert!(b.expire("k", Duration::from_secs(600)).await.unwrap());
        assert_eq!(b.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(b.persist("k").await.unwrap());
        assert!(b.del("k").await.unwrap());
        assert!(!b.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_matching_literal() {
        let b = backend("it_keys").await;
        b.hset("al_ice:info", "name", "x").await.unwrap();
        b.hset("alxice:info", "name", "y").await.unwrap();
        let keys = b.keys_matching("al_", ":info").await.unwrap();
        assert_eq!(keys, vec!["al_ice:info".to_string()]);
    }
}
