//! TVDB v4 client. Thin transcription of the remote payloads into catalog
//! records; ordering filters and persistence decisions live with the sync
//! worker, not here.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::catalog::{
    AliasRecord, CachedEntity, CreditRecord, CreditRole, EpisodeRecord, FullRecord,
    GenreRecord, SeasonRecord,
};
use crate::types::{EntityClass, EntityKey, ExternalId, SyncState};

use super::{MetadataProvider, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api4.thetvdb.com/v4";

/// Page cap for the episode listing walk, well above any real series.
const MAX_EPISODE_PAGES: u32 = 50;

#[derive(Clone, Debug)]
pub struct TvdbSettings {
    pub base_url: String,
    pub api_key: String,
    pub pin: Option<String>,
    pub timeout: Duration,
}

impl TvdbSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            pin: None,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct TvdbProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pin: Option<String>,
    // Bearer token from /login, acquired lazily and dropped on a 401 so the
    // next call re-authenticates.
    token: RwLock<Option<String>>,
}

impl fmt::Debug for TvdbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TvdbProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TvdbProvider {
    pub fn new(settings: TvdbSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            pin: settings.pin,
            token: RwLock::new(None),
        })
    }

    async fn token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        #[derive(Serialize)]
        struct LoginBody<'a> {
            apikey: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            pin: Option<&'a str>,
        }

        #[derive(Deserialize)]
        struct LoginData {
            token: String,
        }

        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&LoginBody {
                apikey: &self.api_key,
                pin: self.pin.as_deref(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 => ProviderError::InvalidApiKey,
                429 => ProviderError::RateLimited,
                code => ProviderError::Upstream {
                    status: code,
                    message: "login failed".into(),
                },
            });
        }

        let envelope: Envelope<LoginData> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let token = envelope.data.token;

        *self.token.write().await = Some(token.clone());
        debug!("authenticated against provider");
        Ok(token)
    }

    async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        let token = self.token().await?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()));
        }

        #[derive(Debug, Deserialize)]
        struct ErrorBody {
            #[serde(default)]
            message: Option<String>,
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| format!("request for {path} failed with {status}"));

        match status.as_u16() {
            401 => {
                // Token likely expired; the next call logs in again.
                *self.token.write().await = None;
                Err(ProviderError::InvalidApiKey)
            }
            404 => Err(ProviderError::NotFound),
            429 => Err(ProviderError::RateLimited),
            code => Err(ProviderError::Upstream {
                status: code,
                message,
            }),
        }
    }

    fn detail_path(class: EntityClass, id: ExternalId) -> String {
        match class {
            EntityClass::Series => format!("/series/{id}"),
            EntityClass::Movie => format!("/movies/{id}"),
            EntityClass::Person => format!("/people/{id}"),
        }
    }

    fn extended_path(class: EntityClass, id: ExternalId) -> String {
        format!("{}/extended", Self::detail_path(class, id))
    }

    /// Walk the paginated aired-order episode listing for a series.
    async fn fetch_episodes(
        &self,
        id: ExternalId,
    ) -> Result<Vec<EpisodeDto>, ProviderError> {
        let mut episodes = Vec::new();

        for page in 0..MAX_EPISODE_PAGES {
            let response: EpisodePage = self
                .get_json(
                    &format!("/series/{id}/episodes/official"),
                    &[("page", page.to_string())],
                )
                .await?;

            let batch = response.data.episodes;
            if batch.is_empty() {
                break;
            }
            episodes.extend(batch);

            if response
                .links
                .as_ref()
                .and_then(|links| links.next.as_ref())
                .is_none()
            {
                break;
            }
        }

        Ok(episodes)
    }
}

#[async_trait]
impl MetadataProvider for TvdbProvider {
    async fn fetch_basic(
        &self,
        class: EntityClass,
        id: ExternalId,
    ) -> Result<CachedEntity, ProviderError> {
        let detail: Envelope<EntityDto> =
            self.get_json(&Self::detail_path(class, id), &[]).await?;

        Ok(detail.data.into_entity(EntityKey::new(class, id)))
    }

    async fn fetch_full(
        &self,
        class: EntityClass,
        id: ExternalId,
    ) -> Result<FullRecord, ProviderError> {
        let extended: Envelope<EntityDto> =
            self.get_json(&Self::extended_path(class, id), &[]).await?;
        let dto = extended.data;

        let key = EntityKey::new(class, id);
        let genres = dto
            .genres
            .iter()
            .filter(|g| !g.name.is_empty())
            .map(|g| GenreRecord::new(g.id, g.name.clone()))
            .collect();
        let credits = dto
            .characters
            .iter()
            .filter_map(CharacterDto::into_credit)
            .collect();
        let aliases = dto
            .aliases
            .iter()
            .map(|a| AliasRecord {
                name: a.name.clone(),
                language: a.language.clone().unwrap_or_else(|| "eng".into()),
            })
            .collect();
        let seasons = dto.seasons.iter().filter_map(SeasonDto::into_record).collect();

        let mut record = FullRecord {
            entity: dto.into_entity(key),
            genres,
            credits,
            aliases,
            seasons,
            episodes: Vec::new(),
        };

        if class == EntityClass::Series {
            record.episodes = self
                .fetch_episodes(id)
                .await?
                .into_iter()
                .filter_map(EpisodeDto::into_record)
                .collect();
        }

        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntityDto {
    name: Option<String>,
    overview: Option<String>,
    /// The provider sends the year as a string for series and a number for
    /// some movie payloads.
    year: Option<serde_json::Value>,
    status: Option<serde_json::Value>,
    image: Option<String>,
    #[serde(rename = "originalLanguage")]
    original_language: Option<String>,
    #[serde(rename = "originalCountry")]
    original_country: Option<String>,
    #[serde(rename = "numberOfSeasons")]
    number_of_seasons: Option<i32>,
    #[serde(rename = "numberOfEpisodes")]
    number_of_episodes: Option<i32>,
    #[serde(rename = "averageRuntime")]
    average_runtime: Option<i32>,
    runtime: Option<i32>,
    biography: Option<String>,
    genres: Vec<GenreDto>,
    characters: Vec<CharacterDto>,
    aliases: Vec<AliasDto>,
    seasons: Vec<SeasonDto>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl EntityDto {
    fn into_entity(self, key: EntityKey) -> CachedEntity {
        let extra = serde_json::Value::Object(self.rest);
        CachedEntity {
            key,
            name: self.name.unwrap_or_default(),
            overview: self.overview.or(self.biography),
            year: coerce_year(self.year.as_ref()),
            status: status_name(self.status.as_ref()),
            image_url: self.image,
            original_language: self.original_language,
            original_country: self.original_country,
            number_of_seasons: self.number_of_seasons,
            number_of_episodes: self.number_of_episodes,
            runtime: self.runtime.or(self.average_runtime),
            extra: (!extra.as_object().map(|m| m.is_empty()).unwrap_or(true))
                .then_some(extra),
            sync_state: SyncState::Basic,
            last_synced_at: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenreDto {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CharacterDto {
    #[serde(rename = "peopleId")]
    people_id: Option<i64>,
    #[serde(rename = "peopleType", default)]
    people_type: Option<String>,
    #[serde(rename = "personName", default)]
    person_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sort: Option<i32>,
}

impl CharacterDto {
    fn into_credit(&self) -> Option<CreditRecord> {
        let person_id = self.people_id?;
        let role =
            CreditRole::from_people_type(self.people_type.as_deref().unwrap_or(""));
        Some(CreditRecord {
            person_id: ExternalId(person_id),
            person_name: self
                .person_name
                .clone()
                .unwrap_or_else(|| "Unknown".into()),
            role,
            character_name: (role == CreditRole::Actor)
                .then(|| self.name.clone())
                .flatten(),
            sort_order: self.sort.unwrap_or(999),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AliasDto {
    name: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeasonDto {
    id: Option<i64>,
    #[serde(default)]
    number: Option<i32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(rename = "type", default)]
    season_type: Option<SeasonTypeDto>,
    #[serde(default)]
    year: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SeasonTypeDto {
    #[serde(rename = "type", default)]
    type_slug: Option<String>,
}

impl SeasonDto {
    fn into_record(&self) -> Option<SeasonRecord> {
        let id = self.id?;
        Some(SeasonRecord {
            external_id: ExternalId(id),
            number: self.number.unwrap_or(0),
            name: self.name.clone(),
            overview: self.overview.clone(),
            image_url: self.image.clone(),
            season_type: self
                .season_type
                .as_ref()
                .and_then(|ty| ty.type_slug.clone()),
            year: coerce_year(self.year.as_ref()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EpisodePage {
    data: EpisodePageData,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct EpisodePageData {
    #[serde(default)]
    episodes: Vec<EpisodeDto>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeDto {
    id: Option<i64>,
    #[serde(rename = "seasonNumber", default)]
    season_number: Option<i32>,
    #[serde(rename = "number", default)]
    episode_number: Option<i32>,
    #[serde(rename = "absoluteNumber", default)]
    absolute_number: Option<i32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    aired: Option<String>,
    #[serde(default)]
    runtime: Option<i32>,
}

impl EpisodeDto {
    fn into_record(self) -> Option<EpisodeRecord> {
        let id = self.id?;
        Some(EpisodeRecord {
            external_id: ExternalId(id),
            season_number: self.season_number.unwrap_or(0),
            episode_number: self.episode_number.unwrap_or(0),
            absolute_number: self.absolute_number,
            name: self.name,
            overview: self.overview,
            image_url: self.image,
            aired: self
                .aired
                .as_deref()
                .and_then(|raw| raw.parse::<chrono::NaiveDate>().ok()),
            runtime: self.runtime,
        })
    }
}

fn coerce_year(value: Option<&serde_json::Value>) -> Option<i32> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64().map(|y| y as i32),
        serde_json::Value::String(s) => s.parse::<i32>().ok(),
        _ => None,
    }
}

fn status_name(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("name")
            .and_then(|name| name.as_str())
            .map(|name| name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityClass;

    #[test]
    fn entity_dto_coerces_year_and_status_shapes() {
        let raw = serde_json::json!({
            "id": 81189,
            "name": "Breaking Bad",
            "overview": "A chemistry teacher.",
            "year": "2008",
            "status": {"id": 2, "name": "Ended"},
            "image": "/banners/posters/81189-10.jpg",
            "originalLanguage": "eng",
            "slug": "breaking-bad"
        });

        let dto: EntityDto = serde_json::from_value(raw).unwrap();
        let entity =
            dto.into_entity(EntityKey::new(EntityClass::Series, 81189));

        assert_eq!(entity.name, "Breaking Bad");
        assert_eq!(entity.year, Some(2008));
        assert_eq!(entity.status.as_deref(), Some("Ended"));
        assert_eq!(entity.sync_state, SyncState::Basic);
        assert!(entity.last_synced_at.is_none());
        // Unmodeled fields survive in the extra blob.
        let extra = entity.extra.unwrap();
        assert_eq!(extra["slug"], "breaking-bad");
    }

    #[test]
    fn character_dto_maps_actor_credit() {
        let raw = serde_json::json!({
            "peopleId": 64,
            "peopleType": "Actor",
            "personName": "Bryan Cranston",
            "name": "Walter White",
            "sort": 1
        });
        let dto: CharacterDto = serde_json::from_value(raw).unwrap();
        let credit = dto.into_credit().unwrap();

        assert_eq!(credit.role, CreditRole::Actor);
        assert_eq!(credit.character_name.as_deref(), Some("Walter White"));

        let crew = CharacterDto {
            people_id: Some(65),
            people_type: Some("Director".into()),
            person_name: Some("Rian Johnson".into()),
            name: Some("ignored".into()),
            sort: None,
        };
        let credit = crew.into_credit().unwrap();
        assert_eq!(credit.role, CreditRole::Director);
        assert!(credit.character_name.is_none());
        assert_eq!(credit.sort_order, 999);
    }

    #[test]
    fn season_dto_surfaces_ordering_type() {
        let raw = serde_json::json!({
            "id": 16005,
            "number": 1,
            "type": {"id": 1, "name": "Aired Order", "type": "official"},
            "year": "2008"
        });
        let dto: SeasonDto = serde_json::from_value(raw).unwrap();
        let season = dto.into_record().unwrap();
        assert_eq!(season.season_type.as_deref(), Some("official"));
        assert_eq!(season.year, Some(2008));
    }

    #[test]
    fn episode_dto_parses_aired_date() {
        let raw = serde_json::json!({
            "id": 349232,
            "seasonNumber": 1,
            "number": 1,
            "aired": "2008-01-20",
            "runtime": 58
        });
        let dto: EpisodeDto = serde_json::from_value(raw).unwrap();
        let episode = dto.into_record().unwrap();
        assert_eq!(
            episode.aired,
            Some(chrono::NaiveDate::from_ymd_opt(2008, 1, 20).unwrap())
        );
    }
}
