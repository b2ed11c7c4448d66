//! Staleness policy: decides whether a cached record is fresh enough to
//! serve without queueing a refresh. Pure logic, no I/O; callers inject the
//! clock.

use chrono::{DateTime, Duration, Utc};

use crate::types::EntityClass;

/// Per-class freshness windows. Values come from configuration so they can
/// be tuned without touching this logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    pub series: Duration,
    pub movie: Duration,
    pub person: Duration,
}

impl TtlPolicy {
    pub fn from_days(series: i64, movie: i64, person: i64) -> Self {
        Self {
            series: Duration::days(series),
            movie: Duration::days(movie),
            person: Duration::days(person),
        }
    }

    pub fn ttl_for(&self, class: EntityClass) -> Duration {
        match class {
            EntityClass::Series => self.series,
            EntityClass::Movie => self.movie,
            EntityClass::Person => self.person,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        // Series and movies go stale after a week; people change rarely and
        // get twice that.
        Self::from_days(7, 7, 14)
    }
}

/// A record with no successful sync is always stale; otherwise it is stale
/// once its age exceeds the class TTL. Monotonic in `now - last_synced_at`.
pub fn is_stale(
    class: EntityClass,
    last_synced_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &TtlPolicy,
) -> bool {
    match last_synced_at {
        None => true,
        Some(synced) => now - synced > policy.ttl_for(class),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        "2026-01-15T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn never_synced_is_always_stale() {
        let policy = TtlPolicy::default();
        for class in EntityClass::all() {
            assert!(is_stale(*class, None, fixed_now(), &policy));
        }
    }

    #[test]
    fn fresh_within_ttl_boundary() {
        let policy = TtlPolicy::default();
        let now = fixed_now();

        let two_days_ago = now - Duration::days(2);
        assert!(!is_stale(EntityClass::Series, Some(two_days_ago), now, &policy));

        // Exactly at the TTL is still fresh; strictly older is stale.
        let at_ttl = now - Duration::days(7);
        assert!(!is_stale(EntityClass::Series, Some(at_ttl), now, &policy));
        let past_ttl = at_ttl - Duration::seconds(1);
        assert!(is_stale(EntityClass::Series, Some(past_ttl), now, &policy));
    }

    #[test]
    fn person_ttl_is_longer() {
        let policy = TtlPolicy::default();
        let now = fixed_now();
        let ten_days_ago = now - Duration::days(10);

        assert!(is_stale(EntityClass::Movie, Some(ten_days_ago), now, &policy));
        assert!(!is_stale(EntityClass::Person, Some(ten_days_ago), now, &policy));
    }

    #[test]
    fn staleness_is_monotonic_in_age() {
        let policy = TtlPolicy::default();
        let synced: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();

        let mut seen_stale = false;
        for hours in 0..(30 * 24) {
            let now = synced + Duration::hours(hours);
            let stale = is_stale(EntityClass::Series, Some(synced), now, &policy);
            if seen_stale {
                assert!(stale, "record went back to fresh at {hours}h");
            }
            seen_stale |= stale;
        }
        assert!(seen_stale);
    }

    #[test]
    fn ttls_come_from_policy_not_constants() {
        let tight = TtlPolicy::from_days(0, 0, 0);
        let now = fixed_now();
        let just_synced = now - Duration::seconds(5);
        assert!(is_stale(EntityClass::Series, Some(just_synced), now, &tight));
    }
}
