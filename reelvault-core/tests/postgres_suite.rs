//! Postgres round-trip coverage. Requires a database: set DATABASE_URL to
//! run, otherwise every test skips.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use reelvault_core::catalog::{
    CachedEntity, CreditRecord, CreditRole, EpisodeRecord, FullRecord,
    GenreRecord, SeasonRecord,
};
use reelvault_core::staleness::TtlPolicy;
use reelvault_core::store::{ContentStore, PostgresContentStore};
use reelvault_core::sync::{
    JobPriority, JobQueue, PostgresJobQueue, SyncJob, SyncLogEntry,
};
use reelvault_core::types::{EntityClass, EntityKey, ExternalId, SyncState};

async fn test_pool() -> Option<PgPool> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping: DATABASE_URL not set");
            return None;
        }
    };

    let pool = match PgPool::connect(&database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("skipping: failed to connect to DATABASE_URL ({err})");
            return None;
        }
    };

    if let Err(err) = reelvault_core::MIGRATOR.run(&pool).await {
        eprintln!("skipping: migrations failed ({err})");
        return None;
    }

    Some(pool)
}

async fn clear_fixture_rows(pool: &PgPool, ids: &[i64]) {
    for table in ["sync_jobs", "sync_log", "content_entities"] {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE external_id = ANY($1)"
        ))
        .bind(ids)
        .execute(pool)
        .await
        .expect("clear fixture rows");
    }
    for table in ["series_seasons", "series_episodes"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE series_id = ANY($1)"))
            .bind(ids)
            .execute(pool)
            .await
            .expect("clear fixture rows");
    }
}

fn series_fixture(id: i64) -> FullRecord {
    let key = EntityKey::new(EntityClass::Series, id);
    let mut entity = CachedEntity::basic(key, "Fixture Series");
    entity.overview = Some("round trip fixture".into());
    entity.year = Some(2008);

    let mut record = FullRecord::new(entity);
    record.genres.push(GenreRecord::new(Some(5), "Drama"));
    record.credits.push(CreditRecord {
        person_id: ExternalId(64),
        person_name: "Bryan Cranston".into(),
        role: CreditRole::Actor,
        character_name: Some("Walter White".into()),
        sort_order: 1,
    });
    record.seasons.push(SeasonRecord {
        external_id: ExternalId(16005),
        number: 1,
        name: None,
        overview: None,
        image_url: None,
        season_type: Some("official".into()),
        year: Some(2008),
    });
    record.episodes.push(EpisodeRecord {
        external_id: ExternalId(349232),
        season_number: 1,
        episode_number: 1,
        absolute_number: Some(1),
        name: Some("Pilot".into()),
        overview: None,
        image_url: None,
        aired: chrono::NaiveDate::from_ymd_opt(2008, 1, 20),
        runtime: Some(58),
    });
    record
}

#[tokio::test]
async fn entity_upsert_round_trip() {
    let Some(pool) = test_pool().await else {
        return;
    };
    clear_fixture_rows(&pool, &[910_001]).await;
    let store = PostgresContentStore::new(pool.clone());
    let key = EntityKey::new(EntityClass::Series, 910_001);

    let basic = CachedEntity::basic(key, "Fixture Series");
    store.upsert_basic(&basic).await.expect("upsert basic");

    let read = store.get(key).await.expect("get").expect("row exists");
    assert_eq!(read.sync_state, SyncState::Basic);
    assert!(read.last_synced_at.is_none());

    let synced_at = Utc::now();
    let record = series_fixture(910_001);
    store
        .upsert_full(&record, synced_at)
        .await
        .expect("upsert full");

    let read = store.get(key).await.expect("get").expect("row exists");
    assert_eq!(read.sync_state, SyncState::Full);
    assert!(read.last_synced_at.is_some());

    // A later basic refresh must not downgrade the synced row.
    store
        .upsert_basic(&CachedEntity::basic(key, "Renamed"))
        .await
        .expect("refresh basic");
    let read = store.get(key).await.expect("get").expect("row exists");
    assert_eq!(read.name, "Renamed");
    assert_eq!(read.sync_state, SyncState::Full);

    // Re-running the same full sync is idempotent.
    store
        .upsert_full(&record, Utc::now())
        .await
        .expect("second upsert full");
    let episodes: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM series_episodes WHERE series_id = $1",
    )
    .bind(910_001_i64)
    .fetch_one(&pool)
    .await
    .expect("count episodes");
    assert_eq!(episodes.0, 1);
}

#[tokio::test]
async fn queue_refuses_duplicate_active_identities() {
    let Some(pool) = test_pool().await else {
        return;
    };
    clear_fixture_rows(&pool, &[920_001]).await;
    // Pull grabs any ready row; start from an empty queue so leftovers from
    // other suites cannot race this one.
    sqlx::query("DELETE FROM sync_jobs")
        .execute(&pool)
        .await
        .expect("clear queue");
    let queue = PostgresJobQueue::new(pool.clone());
    let key = EntityKey::new(EntityClass::Movie, 920_001);

    queue
        .push(SyncJob::new(key, JobPriority::Interactive))
        .await
        .expect("first push");
    queue
        .push(SyncJob::new(key, JobPriority::Background))
        .await
        .expect("duplicate push is dropped, not an error");

    let rows: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sync_jobs WHERE external_id = $1",
    )
    .bind(920_001_i64)
    .fetch_one(&pool)
    .await
    .expect("count jobs");
    assert_eq!(rows.0, 1);

    let job = queue.pull().await.expect("pull").expect("job available");
    assert_eq!(job.key, key);
    assert!(
        queue.pull().await.expect("pull").is_none(),
        "leased job is not handed out twice"
    );

    // Retry path: requeue with a future available_at keeps the job parked.
    let retry = job.next_attempt(Duration::seconds(60));
    queue.requeue(retry).await.expect("requeue");
    assert!(queue.pull().await.expect("pull").is_none());

    queue.complete(job.id).await.expect("complete");
    let rows: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sync_jobs WHERE external_id = $1",
    )
    .bind(920_001_i64)
    .fetch_one(&pool)
    .await
    .expect("count jobs");
    assert_eq!(rows.0, 0);
}

#[tokio::test]
async fn find_stale_and_log_retention() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ids = [930_001_i64, 930_002, 930_003];
    clear_fixture_rows(&pool, &ids).await;
    let store = PostgresContentStore::new(pool.clone());
    let policy = TtlPolicy::default();
    let now = Utc::now();

    for (id, age_days) in [(930_001, 30), (930_002, 10), (930_003, 1)] {
        let key = EntityKey::new(EntityClass::Series, id);
        let record = FullRecord::new(CachedEntity::basic(key, "Fixture"));
        store
            .upsert_full(&record, now - Duration::days(age_days))
            .await
            .expect("seed record");
    }

    let stale = store
        .find_stale(&policy, now, 500)
        .await
        .expect("find stale");
    let stale_ids: Vec<i64> = stale
        .iter()
        .filter(|key| ids.contains(&key.id.as_i64()))
        .map(|key| key.id.as_i64())
        .collect();
    assert_eq!(stale_ids, vec![930_001, 930_002]);

    let key = EntityKey::new(EntityClass::Series, 930_001);
    for (age_days, entry) in [
        (45, SyncLogEntry::success(key, 0, 120)),
        (2, SyncLogEntry::failed(key, 1, "boom")),
    ] {
        let mut entry = entry;
        entry.occurred_at = now - Duration::days(age_days);
        store.append_sync_log(&entry).await.expect("append log");
    }

    let deleted = store
        .delete_sync_logs_older_than(now - Duration::days(30))
        .await
        .expect("retention");
    assert!(deleted >= 1);

    let recent = store.recent_sync_logs(50).await.expect("recent logs");
    assert!(
        recent
            .iter()
            .filter(|entry| entry.key == key)
            .all(|entry| entry.occurred_at >= now - Duration::days(30))
    );
}
