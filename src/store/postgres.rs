//! PostgreSQL storage backend
//!
//! Tracks and index chunks live in per-catalog tables cloned from template
//! tables (`track_tpl`, `track_index_tpl`) inside the catalog-create
//! transaction. Segment queries lean on the `intarray` extension: the
//! overlap operator `&&` prunes non-intersecting chunks through a GIN index
//! and `icount(... & ...)` yields the intersection size per chunk.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::error::Result;
use crate::index::{segment_for_ordinal, NUM_INDEX_SEGMENTS};
use crate::store::{Store, TrackInsert, TrackPage, TrackRow, TrackWrite};

/// PostgreSQL-backed [`Store`].
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to the database and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(PostgresStore { pool })
    }

    /// Wrap an existing pool. Skips migrations.
    pub fn with_pool(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn track_table(catalog_id: i64) -> String {
    format!("track_{catalog_id}")
}

fn index_table(catalog_id: i64, segment: usize) -> String {
    format!("track_index_{catalog_id}_{segment}")
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_account(&self, external_id: &str) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO account (external_id) VALUES ($1) ON CONFLICT (external_id) DO NOTHING")
            .bind(external_id)
            .execute(&mut *tx)
            .await?;
        let id: i64 = sqlx::query_scalar("SELECT id FROM account WHERE external_id = $1")
            .bind(external_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn list_catalogs(&self, account_id: i64) -> Result<Vec<String>> {
        let names =
            sqlx::query_scalar("SELECT name FROM catalog WHERE account_id = $1 ORDER BY name")
                .bind(account_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }

    async fn lookup_catalog(&self, account_id: i64, name: &str) -> Result<Option<i64>> {
        let id =
            sqlx::query_scalar("SELECT id FROM catalog WHERE account_id = $1 AND name = $2")
                .bind(account_id)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    async fn create_catalog(&self, account_id: i64, name: &str) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM catalog WHERE account_id = $1 AND name = $2")
                .bind(account_id)
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO catalog (account_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(account_id)
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE {} (LIKE track_tpl INCLUDING ALL)",
            track_table(id)
        ))
        .execute(&mut *tx)
        .await?;
        for segment in 0..NUM_INDEX_SEGMENTS {
            sqlx::query(&format!(
                "CREATE TABLE {} (LIKE track_index_tpl INCLUDING ALL)",
                index_table(id, segment)
            ))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn delete_catalog(&self, account_id: i64, name: &str) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<i64> = sqlx::query_scalar(
            "DELETE FROM catalog WHERE account_id = $1 AND name = $2 RETURNING id",
        )
        .bind(account_id)
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;
        let id = match deleted {
            Some(id) => id,
            None => return Ok(None),
        };

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", track_table(id)))
            .execute(&mut *tx)
            .await?;
        for segment in 0..NUM_INDEX_SEGMENTS {
            sqlx::query(&format!(
                "DROP TABLE IF EXISTS {}",
                index_table(id, segment)
            ))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(id))
    }

    async fn replace_track(
        &self,
        catalog_id: i64,
        track: TrackInsert<'_>,
    ) -> Result<TrackWrite> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<i64> = sqlx::query_scalar(&format!(
            "DELETE FROM {} WHERE external_id = $1 RETURNING id",
            track_table(catalog_id)
        ))
        .bind(track.external_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(old_id) = previous {
            for segment in 0..NUM_INDEX_SEGMENTS {
                sqlx::query(&format!(
                    "DELETE FROM {} WHERE track_id = $1",
                    index_table(catalog_id, segment)
                ))
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if !track.allow_duplicate {
            let duplicates: i64 = sqlx::query_scalar(&format!(
                "SELECT count(*) FROM {} WHERE fingerprint_sha1 = $1",
                track_table(catalog_id)
            ))
            .bind(track.fingerprint_sha1.as_slice())
            .fetch_one(&mut *tx)
            .await?;
            if duplicates > 0 {
                // Dropping the transaction rolls the delete back.
                return Ok(TrackWrite {
                    created: false,
                    replaced: false,
                });
            }
        }

        let id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {} (external_id, fingerprint, fingerprint_sha1, metadata) \
             VALUES ($1, $2, $3, $4) RETURNING id",
            track_table(catalog_id)
        ))
        .bind(track.external_id)
        .bind(track.fingerprint)
        .bind(track.fingerprint_sha1.as_slice())
        .bind(track.metadata)
        .fetch_one(&mut *tx)
        .await?;

        for chunk in track.chunks {
            sqlx::query(&format!(
                "INSERT INTO {} (track_id, chunk_ordinal, \"values\") VALUES ($1, $2, $3)",
                index_table(catalog_id, segment_for_ordinal(chunk.ordinal))
            ))
            .bind(id)
            .bind(chunk.ordinal as i32)
            .bind(&chunk.values)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(TrackWrite {
            created: true,
            replaced: previous.is_some(),
        })
    }

    async fn delete_track(&self, catalog_id: i64, external_id: &str) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<i64> = sqlx::query_scalar(&format!(
            "DELETE FROM {} WHERE external_id = $1 RETURNING id",
            track_table(catalog_id)
        ))
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?;
        let id = match deleted {
            Some(id) => id,
            None => return Ok(None),
        };

        for segment in 0..NUM_INDEX_SEGMENTS {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE track_id = $1",
                index_table(catalog_id, segment)
            ))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(id))
    }

    async fn get_track(
        &self,
        catalog_id: i64,
        external_id: &str,
    ) -> Result<Option<TrackRow>> {
        let row = sqlx::query(&format!(
            "SELECT id, external_id, metadata FROM {} WHERE external_id = $1",
            track_table(catalog_id)
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| TrackRow {
            id: row.get(0),
            external_id: row.get(1),
            metadata: row.get(2),
        }))
    }

    async fn list_tracks(
        &self,
        catalog_id: i64,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TrackPage> {
        let rows = sqlx::query(&format!(
            "SELECT id, external_id, metadata FROM {} \
             WHERE external_id > $1 ORDER BY external_id LIMIT $2",
            track_table(catalog_id)
        ))
        .bind(cursor.unwrap_or(""))
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() > limit;
        let tracks = rows
            .into_iter()
            .take(limit)
            .map(|row| TrackRow {
                id: row.get(0),
                external_id: row.get(1),
                metadata: row.get(2),
            })
            .collect();
        Ok(TrackPage { tracks, has_more })
    }

    async fn load_fingerprint(&self, catalog_id: i64, track_id: i64) -> Result<Vec<u8>> {
        let fingerprint: Vec<u8> = sqlx::query_scalar(&format!(
            "SELECT fingerprint FROM {} WHERE id = $1",
            track_table(catalog_id)
        ))
        .bind(track_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(fingerprint)
    }

    async fn load_track_rows(&self, catalog_id: i64, ids: &[i64]) -> Result<Vec<TrackRow>> {
        let rows = sqlx::query(&format!(
            "SELECT id, external_id, metadata FROM {} WHERE id = ANY($1)",
            track_table(catalog_id)
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| TrackRow {
                id: row.get(0),
                external_id: row.get(1),
                metadata: row.get(2),
            })
            .collect())
    }

    async fn query_segment(
        &self,
        catalog_id: i64,
        segment: usize,
        query: &[i32],
    ) -> Result<Vec<(i64, usize)>> {
        let rows = sqlx::query(&format!(
            "SELECT track_id, icount(\"values\" & q.query) \
             FROM {}, (SELECT $1::int4[] AS query) q \
             WHERE \"values\" && q.query",
            index_table(catalog_id, segment)
        ))
        .bind(query.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<i64, _>(0), row.get::<i32, _>(1) as usize))
            .collect())
    }
}
