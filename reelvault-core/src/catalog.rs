//! Cached catalog records: the root entity plus the relational sub-entities
//! a full sync populates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntityClass, EntityKey, ExternalId, SyncState};

/// Locally persisted copy of a provider entity (series, movie, or person).
///
/// Core fields are a typed projection of the provider payload; the raw
/// payload itself rides along in `extra` so fields this subsystem does not
/// model are not lost between syncs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedEntity {
    pub key: EntityKey,
    pub name: String,
    pub overview: Option<String>,
    pub year: Option<i32>,
    pub status: Option<String>,
    pub image_url: Option<String>,
    pub original_language: Option<String>,
    pub original_country: Option<String>,
    /// Series only: season/episode counts surfaced on the detail page.
    pub number_of_seasons: Option<i32>,
    pub number_of_episodes: Option<i32>,
    /// Runtime in minutes (movies), average runtime (series).
    pub runtime: Option<i32>,
    pub extra: Option<serde_json::Value>,
    pub sync_state: SyncState,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CachedEntity {
    /// A fresh `Basic` record as created on first sight of an id. No
    /// relational data, never synced.
    pub fn basic(key: EntityKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            overview: None,
            year: None,
            status: None,
            image_url: None,
            original_language: None,
            original_country: None,
            number_of_seasons: None,
            number_of_episodes: None,
            runtime: None,
            extra: None,
            sync_state: SyncState::Basic,
            last_synced_at: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenreRecord {
    pub external_id: Option<ExternalId>,
    pub name: String,
    pub slug: String,
}

impl GenreRecord {
    pub fn new(external_id: Option<i64>, name: impl Into<String>) -> Self {
        let name = name.into();
        let slug = name.to_lowercase().replace(' ', "-");
        Self {
            external_id: external_id.map(ExternalId),
            name,
            slug,
        }
    }
}

/// Role a person plays in a credit, normalized from the provider's free-form
/// people type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditRole {
    Actor,
    Director,
    Writer,
    Producer,
    ExecutiveProducer,
    Crew,
}

impl CreditRole {
    pub fn from_people_type(people_type: &str) -> Self {
        match people_type {
            "Actor" => CreditRole::Actor,
            "Director" => CreditRole::Director,
            "Writer" => CreditRole::Writer,
            "Producer" => CreditRole::Producer,
            "Executive Producer" => CreditRole::ExecutiveProducer,
            _ => CreditRole::Crew,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditRole::Actor => "actor",
            CreditRole::Director => "director",
            CreditRole::Writer => "writer",
            CreditRole::Producer => "producer",
            CreditRole::ExecutiveProducer => "executive_producer",
            CreditRole::Crew => "crew",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditRecord {
    pub person_id: ExternalId,
    pub person_name: String,
    pub role: CreditRole,
    /// Character name, actors only.
    pub character_name: Option<String>,
    pub sort_order: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AliasRecord {
    pub name: String,
    pub language: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeasonRecord {
    pub external_id: ExternalId,
    pub number: i32,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub image_url: Option<String>,
    /// Provider ordering this season belongs to ("official", "dvd",
    /// "absolute", ...). Only the official aired order is persisted.
    pub season_type: Option<String>,
    pub year: Option<i32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub external_id: ExternalId,
    pub season_number: i32,
    pub episode_number: i32,
    pub absolute_number: Option<i32>,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub image_url: Option<String>,
    pub aired: Option<NaiveDate>,
    pub runtime: Option<i32>,
}

/// Everything a full sync writes for one entity: the root record plus all
/// relational sub-entities. Persisted atomically by the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullRecord {
    pub entity: CachedEntity,
    pub genres: Vec<GenreRecord>,
    pub credits: Vec<CreditRecord>,
    pub aliases: Vec<AliasRecord>,
    pub seasons: Vec<SeasonRecord>,
    pub episodes: Vec<EpisodeRecord>,
}

/// Season ordering kept when the provider exposes alternates. Product
/// decision: only the canonical aired order is persisted.
pub const AIRED_ORDER: &str = "official";

impl FullRecord {
    pub fn new(entity: CachedEntity) -> Self {
        Self {
            entity,
            genres: Vec::new(),
            credits: Vec::new(),
            aliases: Vec::new(),
            seasons: Vec::new(),
            episodes: Vec::new(),
        }
    }

    pub fn key(&self) -> EntityKey {
        self.entity.key
    }

    /// Drop seasons belonging to alternate orderings, and episodes whose
    /// season number no longer exists afterwards. Seasons without a type tag
    /// are kept (movies/person records never carry seasons, and some provider
    /// payloads omit the tag for the default ordering).
    pub fn retain_aired_order(&mut self) {
        if self.entity.key.class != EntityClass::Series {
            return;
        }

        self.seasons.retain(|season| {
            season
                .season_type
                .as_deref()
                .map(|ty| ty == AIRED_ORDER)
                .unwrap_or(true)
        });

        let kept: std::collections::HashSet<i32> =
            self.seasons.iter().map(|s| s.number).collect();
        self.episodes
            .retain(|episode| kept.contains(&episode.season_number));
    }
}
