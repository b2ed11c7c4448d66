//! Postgres-backed content store.
//!
//! `upsert_full` runs inside a single transaction: the root row, the
//! delete-and-rewrite of every sub-entity table, and the flip to
//! `sync_state = 'full'` commit together or not at all, so readers never see
//! a half-synced full record.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::catalog::{CachedEntity, FullRecord};
use crate::error::{CacheError, Result};
use crate::staleness::TtlPolicy;
use crate::sync::log::{SyncLogEntry, SyncOutcome};
use crate::types::{EntityClass, EntityKey, ExternalId, SyncState};

use super::ContentStore;

#[derive(Clone)]
pub struct PostgresContentStore {
    pool: PgPool,
}

impl fmt::Debug for PostgresContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresContentStore")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct EntityRow {
    entity_class: String,
    external_id: i64,
    name: String,
    overview: Option<String>,
    year: Option<i32>,
    status: Option<String>,
    image_url: Option<String>,
    original_language: Option<String>,
    original_country: Option<String>,
    number_of_seasons: Option<i32>,
    number_of_episodes: Option<i32>,
    runtime: Option<i32>,
    extra: Option<serde_json::Value>,
    sync_state: String,
    last_synced_at: Option<DateTime<Utc>>,
}

impl EntityRow {
    fn into_entity(self) -> Result<CachedEntity> {
        Ok(CachedEntity {
            key: EntityKey {
                class: self.entity_class.parse()?,
                id: ExternalId(self.external_id),
            },
            name: self.name,
            overview: self.overview,
            year: self.year,
            status: self.status,
            image_url: self.image_url,
            original_language: self.original_language,
            original_country: self.original_country,
            number_of_seasons: self.number_of_seasons,
            number_of_episodes: self.number_of_episodes,
            runtime: self.runtime,
            extra: self.extra,
            sync_state: self.sync_state.parse()?,
            last_synced_at: self.last_synced_at,
        })
    }
}

const ENTITY_COLUMNS: &str = "entity_class, external_id, name, overview, year, status, image_url, \
     original_language, original_country, number_of_seasons, number_of_episodes, \
     runtime, extra, sync_state, last_synced_at";

/// Upsert of the core columns only; `sync_state`/`last_synced_at` of an
/// existing row are left alone so a racing miss-path write can never
/// downgrade a synced record.
const UPSERT_CORE_SQL: &str = r#"
    INSERT INTO content_entities (
        entity_class, external_id, name, overview, year, status, image_url,
        original_language, original_country, number_of_seasons,
        number_of_episodes, runtime, extra
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (entity_class, external_id) DO UPDATE SET
        name = EXCLUDED.name,
        overview = EXCLUDED.overview,
        year = EXCLUDED.year,
        status = EXCLUDED.status,
        image_url = EXCLUDED.image_url,
        original_language = EXCLUDED.original_language,
        original_country = EXCLUDED.original_country,
        number_of_seasons = EXCLUDED.number_of_seasons,
        number_of_episodes = EXCLUDED.number_of_episodes,
        runtime = EXCLUDED.runtime,
        extra = EXCLUDED.extra,
        updated_at = NOW()
"#;

fn bind_core<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    entity: &'q CachedEntity,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(entity.key.class.as_str())
        .bind(entity.key.id.as_i64())
        .bind(&entity.name)
        .bind(&entity.overview)
        .bind(entity.year)
        .bind(&entity.status)
        .bind(&entity.image_url)
        .bind(&entity.original_language)
        .bind(&entity.original_country)
        .bind(entity.number_of_seasons)
        .bind(entity.number_of_episodes)
        .bind(entity.runtime)
        .bind(&entity.extra)
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    async fn get(&self, key: EntityKey) -> Result<Option<CachedEntity>> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM content_entities \
             WHERE entity_class = $1 AND external_id = $2"
        ))
        .bind(key.class.as_str())
        .bind(key.id.as_i64())
        .fetch_optional(self.pool())
        .await?;

        row.map(EntityRow::into_entity).transpose()
    }

    async fn upsert_basic(&self, entity: &CachedEntity) -> Result<()> {
        bind_core(sqlx::query(UPSERT_CORE_SQL), entity)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn upsert_full(
        &self,
        record: &FullRecord,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = record.key();
        let class = key.class.as_str();
        let id = key.id.as_i64();

        let mut tx = self.pool.begin().await?;

        bind_core(sqlx::query(UPSERT_CORE_SQL), &record.entity)
            .execute(&mut *tx)
            .await?;

        // Children are rewritten wholesale each sync; upstream is the source
        // of truth for membership, not just field values.
        for table in ["content_genres", "content_credits", "content_aliases"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE entity_class = $1 AND external_id = $2"
            ))
            .bind(class)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        for genre in &record.genres {
            sqlx::query(
                "INSERT INTO content_genres (entity_class, external_id, genre_id, name, slug) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(class)
            .bind(id)
            .bind(genre.external_id.map(|g| g.as_i64()))
            .bind(&genre.name)
            .bind(&genre.slug)
            .execute(&mut *tx)
            .await?;
        }

        for credit in &record.credits {
            sqlx::query(
                "INSERT INTO content_credits (entity_class, external_id, person_id, \
                 person_name, role_type, character_name, sort_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(class)
            .bind(id)
            .bind(credit.person_id.as_i64())
            .bind(&credit.person_name)
            .bind(credit.role.as_str())
            .bind(&credit.character_name)
            .bind(credit.sort_order)
            .execute(&mut *tx)
            .await?;
        }

        for alias in &record.aliases {
            sqlx::query(
                "INSERT INTO content_aliases (entity_class, external_id, name, language) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(class)
            .bind(id)
            .bind(&alias.name)
            .bind(&alias.language)
            .execute(&mut *tx)
            .await?;
        }

        if key.class == EntityClass::Series {
            for table in ["series_episodes", "series_seasons"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE series_id = $1"))
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }

            for season in &record.seasons {
                sqlx::query(
                    "INSERT INTO series_seasons (series_id, season_id, number, name, \
                     overview, image_url, season_type, year) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(id)
                .bind(season.external_id.as_i64())
                .bind(season.number)
                .bind(&season.name)
                .bind(&season.overview)
                .bind(&season.image_url)
                .bind(&season.season_type)
                .bind(season.year)
                .execute(&mut *tx)
                .await?;
            }

            for episode in &record.episodes {
                sqlx::query(
                    "INSERT INTO series_episodes (series_id, episode_id, season_number, \
                     episode_number, absolute_number, name, overview, image_url, aired, runtime) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(id)
                .bind(episode.external_id.as_i64())
                .bind(episode.season_number)
                .bind(episode.episode_number)
                .bind(episode.absolute_number)
                .bind(&episode.name)
                .bind(&episode.overview)
                .bind(&episode.image_url)
                .bind(episode.aired)
                .bind(episode.runtime)
                .execute(&mut *tx)
                .await?;
            }
        }

        // Every sub-write landed; only now does the row become `full`.
        sqlx::query(
            "UPDATE content_entities SET sync_state = $3, last_synced_at = $4, \
             updated_at = NOW() WHERE entity_class = $1 AND external_id = $2",
        )
        .bind(class)
        .bind(id)
        .bind(SyncState::Full.as_str())
        .bind(synced_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%key, "full record committed");
        Ok(())
    }

    async fn find_stale(
        &self,
        policy: &TtlPolicy,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EntityKey>> {
        let mut stale = Vec::new();

        // TTLs differ per class, so each class gets its own cutoff.
        for class in EntityClass::all() {
            let remaining = limit - stale.len() as i64;
            if remaining <= 0 {
                break;
            }
            let cutoff = now - policy.ttl_for(*class);

            let rows = sqlx::query_as::<_, (i64,)>(
                "SELECT external_id FROM content_entities \
                 WHERE entity_class = $1 \
                   AND (last_synced_at IS NULL OR last_synced_at < $2) \
                 ORDER BY last_synced_at ASC NULLS FIRST \
                 LIMIT $3",
            )
            .bind(class.as_str())
            .bind(cutoff)
            .bind(remaining)
            .fetch_all(self.pool())
            .await?;

            stale.extend(
                rows.into_iter()
                    .map(|(external_id,)| EntityKey::new(*class, external_id)),
            );
        }

        Ok(stale)
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_log (entity_class, external_id, attempt, outcome, \
             error_detail, duration_ms, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.key.class.as_str())
        .bind(entry.key.id.as_i64())
        .bind(i32::from(entry.attempt))
        .bind(entry.outcome.as_str())
        .bind(&entry.error_detail)
        .bind(entry.duration_ms)
        .bind(entry.occurred_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete_sync_logs_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sync_log WHERE occurred_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn recent_sync_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        #[derive(sqlx::FromRow)]
        struct LogRow {
            entity_class: String,
            external_id: i64,
            attempt: i32,
            outcome: String,
            error_detail: Option<String>,
            duration_ms: Option<i64>,
            occurred_at: DateTime<Utc>,
        }

        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT entity_class, external_id, attempt, outcome, error_detail, \
             duration_ms, occurred_at \
             FROM sync_log ORDER BY occurred_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SyncLogEntry {
                    key: EntityKey {
                        class: row.entity_class.parse()?,
                        id: ExternalId(row.external_id),
                    },
                    attempt: u16::try_from(row.attempt).map_err(|_| {
                        CacheError::Internal(format!(
                            "sync log row carries invalid attempt {}",
                            row.attempt
                        ))
                    })?,
                    outcome: row.outcome.parse::<SyncOutcome>()?,
                    occurred_at: row.occurred_at,
                    error_detail: row.error_detail,
                    duration_ms: row.duration_ms,
                })
            })
            .collect()
    }
}
