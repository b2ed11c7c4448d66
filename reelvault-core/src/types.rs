use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Entity classes the cache knows how to resolve and sync.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Series,
    Movie,
    Person,
}

impl EntityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Series => "series",
            EntityClass::Movie => "movie",
            EntityClass::Person => "person",
        }
    }

    pub fn all() -> &'static [Self] {
        &[EntityClass::Series, EntityClass::Movie, EntityClass::Person]
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityClass {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "series" => Ok(EntityClass::Series),
            "movie" => Ok(EntityClass::Movie),
            "person" => Ok(EntityClass::Person),
            other => Err(CacheError::Internal(format!(
                "unrecognized entity class {other:?}"
            ))),
        }
    }
}

/// The metadata provider's own identifier for an entity. Unique per entity
/// class, stable across syncs; used as the cache key.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ExternalId(pub i64);

impl ExternalId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ExternalId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Cache identity of an entity. Also the dedup identity for sync jobs: at
/// most one sync for a given key is ever in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub class: EntityClass,
    pub id: ExternalId,
}

impl EntityKey {
    pub fn new(class: EntityClass, id: impl Into<ExternalId>) -> Self {
        Self {
            class,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.id)
    }
}

/// Persistence depth of a cached record.
///
/// `Basic` rows were seeded from a detail response and have no relational
/// data yet; `Full` rows carry every sub-entity written in one sync
/// operation. Absence of the row is the third state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Basic,
    Full,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Basic => "basic",
            SyncState::Full => "full",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "basic" => Ok(SyncState::Basic),
            "full" => Ok(SyncState::Full),
            other => Err(CacheError::Internal(format!(
                "unrecognized sync state {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_class_round_trips_through_str() {
        for class in EntityClass::all() {
            assert_eq!(class.as_str().parse::<EntityClass>().unwrap(), *class);
        }
    }

    #[test]
    fn entity_key_display_is_class_scoped() {
        let key = EntityKey::new(EntityClass::Series, 81189);
        assert_eq!(key.to_string(), "series:81189");
        assert_ne!(
            key,
            EntityKey::new(EntityClass::Movie, 81189),
            "same id under a different class is a different identity"
        );
    }
}
