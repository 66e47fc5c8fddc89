//! Builds a [`Principal`] from resolved credentials, with a
//! short-TTL cache keyed by a hash of the credential.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use computor_core::{ApiError, Claims, CourseRole, Principal};

/// Abstraction over the database reads that assemble a Principal, kept
/// separate from any particular query-builder so the builder itself is
/// storage-agnostic and unit-testable with a fake.
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Global role strings for a user (`UserRole` table).
    async fn global_roles(&self, user_id: Uuid) -> Result<Vec<String>, ApiError>;

    /// `(course_id, role)` pairs from the user's `CourseMember` rows.
    async fn course_memberships(&self, user_id: Uuid) -> Result<Vec<(Uuid, CourseRole)>, ApiError>;

    /// `(resource, action)` rows expanded from role-claim tables for the
    /// given global roles.
    async fn general_claims(&self, roles: &[String]) -> Result<Vec<(String, String)>, ApiError>;
}

pub struct PrincipalBuilder<R: PrincipalRepository> {
    repository: R,
}

impl<R: PrincipalRepository> PrincipalBuilder<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Assembles a full [`Principal`] by resolving roles, claims, and
    /// memberships in order.
    pub async fn build(&self, user_id: Uuid) -> Result<Principal, ApiError> {
        let mut principal = Principal::new(user_id);

        principal.roles = self.repository.global_roles(user_id).await?;

        for (course_id, role) in self.repository.course_memberships(user_id).await? {
            principal.claims.grant_course_role(course_id, role);
        }

        let general = self.repository.general_claims(&principal.roles).await?;
        principal.claims.general = general.into_iter().collect();

        principal.recompute_is_admin();
        Ok(principal)
    }
}

/// Hash of a credential, used as the principal-cache key so raw tokens
/// never sit in process memory as map keys.
pub fn credential_cache_key(raw_credential: &str) -> String {
    let digest = Sha256::digest(raw_credential.as_bytes());
    hex::encode(digest)
}

struct CacheEntry {
    principal: Principal,
    inserted_at: Instant,
}

/// In-memory TTL cache for built principals: cached for AUTH_CACHE_TTL
/// (≈10s) keyed by a hash of the credential; invalidation on token
/// revoke deletes the entry.
pub struct PrincipalCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PrincipalCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Principal> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.principal.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, principal: Principal) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                principal,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Called on token/session revocation so no stale Principal survives
    /// past the revoke, even within the TTL window.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRepository {
        roles: Vec<String>,
        memberships: Vec<(Uuid, CourseRole)>,
        claims: Vec<(String, String)>,
    }

    #[async_trait]
    impl PrincipalRepository for FakeRepository {
        async fn global_roles(&self, _user_id: Uuid) -> Result<Vec<String>, ApiError> {
            Ok(self.roles.clone())
        }

        async fn course_memberships(
            &self,
            _user_id: Uuid,
        ) -> Result<Vec<(Uuid, CourseRole)>, ApiError> {
            Ok(self.memberships.clone())
        }

        async fn general_claims(&self, _roles: &[String]) -> Result<Vec<(String, String)>, ApiError> {
            Ok(self.claims.clone())
        }
    }

    #[tokio::test]
    async fn admin_role_string_sets_is_admin() {
        let repo = FakeRepository {
            roles: vec!["_admin".to_string()],
            memberships: vec![],
            claims: vec![],
        };
        let builder = PrincipalBuilder::new(repo);
        let principal = builder.build(Uuid::new_v4()).await.unwrap();
        assert!(principal.is_admin);
    }

    #[tokio::test]
    async fn course_membership_grants_dependent_claim() {
        let course_id = Uuid::new_v4();
        let repo = FakeRepository {
            roles: vec![],
            memberships: vec![(course_id, CourseRole::Lecturer)],
            claims: vec![],
        };
        let builder = PrincipalBuilder::new(repo);
        let principal = builder.build(Uuid::new_v4()).await.unwrap();
        assert_eq!(principal.course_role(course_id), Some(CourseRole::Lecturer));
        assert!(principal.has_course_role_at_least(course_id, CourseRole::Student));
    }

    #[test]
    fn cache_expires_entries_past_ttl() {
        let cache = PrincipalCache::new(Duration::from_millis(10));
        let key = credential_cache_key("some-token");
        cache.put(key.clone(), Principal::new(Uuid::new_v4()));
        assert!(cache.get(&key).is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn invalidate_removes_entry_immediately() {
        let cache = PrincipalCache::new(Duration::from_secs(10));
        let key = credential_cache_key("some-token");
        cache.put(key.clone(), Principal::new(Uuid::new_v4()));
        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }
}
